//! The `$SYSTEM` built-in dynamic object.
//!
//! Members are dynamic variants (getter/setter pairs); setter variants
//! take `!` as their first positional in HVML source, which reaches us
//! as a plain setter call. Locale and timezone writes stay thread-local
//! overrides rather than mutating process state.

use crate::error::{Error, ErrorKind, Result};
use crate::variant::Variant;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

pub const HVML_SPEC_VERSION: &str = "1.0";
pub const HVML_SPEC_RELEASE: &str = "100";

thread_local! {
    static LOCALES: RefCell<FxHashMap<String, String>> = RefCell::new(FxHashMap::default());
    static TIMEZONE: RefCell<Option<String>> = const { RefCell::new(None) };
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

fn arg(args: &[Variant], idx: usize) -> Result<&Variant> {
    args.get(idx)
        .ok_or_else(|| Error::argument_missed(format!("argument #{}", idx)))
}

fn arg_str(args: &[Variant], idx: usize) -> Result<String> {
    let v = arg(args, idx)?;
    v.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Error::wrong_data_type("string", v.type_name()))
}

// ── const ─────────────────────────────────────────────────────────────

fn const_getter(args: &[Variant]) -> Result<Variant> {
    let name = arg_str(args, 0)?;
    let value = match name.as_str() {
        "HVML_SPEC_VERSION" => HVML_SPEC_VERSION,
        "HVML_SPEC_RELEASE" => HVML_SPEC_RELEASE,
        "HVML_INTRPR_NAME" => env!("CARGO_PKG_NAME"),
        "HVML_INTRPR_VERSION" => env!("CARGO_PKG_VERSION"),
        _ => return Err(Error::with_detail(ErrorKind::InvalidValue, name)),
    };
    Ok(Variant::string_static(value))
}

// ── uname ─────────────────────────────────────────────────────────────

#[cfg(unix)]
fn uname_parts() -> Vec<(&'static str, String)> {
    use std::ffi::CStr;

    fn field(buf: &[libc::c_char]) -> String {
        // SAFETY: uname nul-terminates every field it fills in.
        unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    // SAFETY: utsname is plain old data and uname only writes into the
    // struct we hand it.
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::uname(&mut uts) };
    if ret != 0 {
        return uname_parts_fallback();
    }

    vec![
        ("kernel-name", field(&uts.sysname)),
        ("nodename", field(&uts.nodename)),
        ("kernel-release", field(&uts.release)),
        ("kernel-version", field(&uts.version)),
        ("machine", field(&uts.machine)),
        ("operating-system", std::env::consts::OS.to_string()),
    ]
}

#[cfg(not(unix))]
fn uname_parts() -> Vec<(&'static str, String)> {
    uname_parts_fallback()
}

fn uname_parts_fallback() -> Vec<(&'static str, String)> {
    vec![
        ("kernel-name", std::env::consts::OS.to_string()),
        ("nodename", String::from("localhost")),
        ("kernel-release", String::from("unknown")),
        ("kernel-version", String::from("unknown")),
        ("machine", std::env::consts::ARCH.to_string()),
        ("operating-system", std::env::consts::OS.to_string()),
    ]
}

fn uname_getter(_args: &[Variant]) -> Result<Variant> {
    Ok(Variant::object(
        uname_parts()
            .into_iter()
            .map(|(k, v)| (k.to_string(), Variant::string(v)))
            .collect::<Vec<_>>(),
    ))
}

/// `uname_prt('kernel-name kernel-release')`: space-joined subset.
fn uname_prt_getter(args: &[Variant]) -> Result<Variant> {
    let wanted = if args.is_empty() {
        String::from("kernel-name")
    } else {
        arg_str(args, 0)?
    };
    let parts = uname_parts();
    let mut out = Vec::new();
    for token in wanted.split_whitespace() {
        if token == "all" {
            for (_, v) in &parts {
                out.push(v.clone());
            }
            continue;
        }
        if let Some((_, v)) = parts.iter().find(|(k, _)| *k == token) {
            out.push(v.clone());
        }
    }
    Ok(Variant::string(out.join(" ")))
}

// ── time ──────────────────────────────────────────────────────────────

fn now_since_epoch() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn time_getter(_args: &[Variant]) -> Result<Variant> {
    Ok(Variant::ULongInt(now_since_epoch().as_secs()))
}

/// `time_us()` / `time_us(true)` return a long double of seconds;
/// `time_us(false)` returns `{sec, usec}`.
fn time_us_getter(args: &[Variant]) -> Result<Variant> {
    let as_longdouble = match args.first() {
        None => true,
        Some(v) => v.as_bool().unwrap_or(true),
    };
    let d = now_since_epoch();
    if as_longdouble {
        Ok(Variant::LongDouble(d.as_secs_f64()))
    } else {
        Ok(Variant::object(vec![
            ("sec", Variant::ULongInt(d.as_secs())),
            ("usec", Variant::ULongInt(d.subsec_micros() as u64)),
        ]))
    }
}

// ── locale ────────────────────────────────────────────────────────────

fn default_locale() -> String {
    std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_else(|_| String::from("C"))
}

fn locale_getter(args: &[Variant]) -> Result<Variant> {
    let category = if args.is_empty() {
        String::from("messages")
    } else {
        arg_str(args, 0)?
    };
    let value = LOCALES.with(|l| l.borrow().get(&category).cloned());
    Ok(Variant::string(value.unwrap_or_else(default_locale)))
}

fn locale_setter(args: &[Variant]) -> Result<Variant> {
    let category = arg_str(args, 0)?;
    let value = arg_str(args, 1)?;
    LOCALES.with(|l| l.borrow_mut().insert(category, value));
    Ok(Variant::Boolean(true))
}

// ── timezone ──────────────────────────────────────────────────────────

fn timezone_from_localtime() -> Option<String> {
    // /etc/localtime is a symlink into the zoneinfo tree
    let target = std::fs::read_link("/etc/localtime").ok()?;
    let s = target.to_string_lossy();
    s.split_once("zoneinfo/").map(|(_, zone)| zone.to_string())
}

fn timezone_getter(_args: &[Variant]) -> Result<Variant> {
    if let Some(tz) = TIMEZONE.with(|t| t.borrow().clone()) {
        return Ok(Variant::string(tz));
    }
    if let Ok(tz) = std::env::var("TZ") {
        if !tz.is_empty() {
            return Ok(Variant::string(tz));
        }
    }
    Ok(Variant::string(
        timezone_from_localtime().unwrap_or_else(|| String::from("UTC")),
    ))
}

fn timezone_setter(args: &[Variant]) -> Result<Variant> {
    let zone = arg_str(args, 0)?;
    if zone.is_empty() {
        return Err(Error::invalid_value("empty timezone"));
    }
    TIMEZONE.with(|t| *t.borrow_mut() = Some(zone));
    Ok(Variant::Boolean(true))
}

// ── random ────────────────────────────────────────────────────────────

fn random_getter(args: &[Variant]) -> Result<Variant> {
    match args.first() {
        None => Ok(Variant::Number(RNG.with(|r| r.borrow_mut().gen::<f64>()))),
        Some(upper) => {
            let upper = upper.numberify();
            if upper <= 0.0 {
                return Err(Error::invalid_value("upper bound must be positive"));
            }
            Ok(Variant::Number(
                RNG.with(|r| r.borrow_mut().gen::<f64>()) * upper,
            ))
        }
    }
}

fn random_setter(args: &[Variant]) -> Result<Variant> {
    let seed = arg(args, 0)?.cast_to_ulongint(true)?;
    RNG.with(|r| *r.borrow_mut() = StdRng::seed_from_u64(seed));
    Ok(Variant::Boolean(true))
}

// ── cwd / env ─────────────────────────────────────────────────────────

fn cwd_getter(_args: &[Variant]) -> Result<Variant> {
    let dir = std::env::current_dir()
        .map_err(|e| Error::with_detail(ErrorKind::OsFailure, e.to_string()))?;
    Ok(Variant::string(dir.to_string_lossy().to_string()))
}

fn cwd_setter(args: &[Variant]) -> Result<Variant> {
    let path = arg_str(args, 0)?;
    std::env::set_current_dir(&path)
        .map_err(|e| Error::with_detail(ErrorKind::AccessDenied, e.to_string()))?;
    Ok(Variant::Boolean(true))
}

fn env_getter(args: &[Variant]) -> Result<Variant> {
    let name = arg_str(args, 0)?;
    match std::env::var(&name) {
        Ok(v) => Ok(Variant::string(v)),
        Err(_) => Ok(Variant::Undefined),
    }
}

fn env_setter(args: &[Variant]) -> Result<Variant> {
    let name = arg_str(args, 0)?;
    match arg(args, 1)? {
        Variant::Undefined => {
            // SAFETY: environment mutation races with concurrent getenv;
            // $SYSTEM setters run on an instance thread under the host's
            // control, which owns the process environment per the
            // platform contract of setenv/unsetenv.
            unsafe { std::env::remove_var(&name) };
        }
        v => {
            let value = v
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| v.stringify());
            // SAFETY: as above; the host serialises environment writes.
            unsafe { std::env::set_var(&name, value) };
        }
    }
    Ok(Variant::Boolean(true))
}

/// Build the `$SYSTEM` object.
pub fn make_system() -> Variant {
    Variant::object(vec![
        ("const", Variant::dynamic(const_getter, None)),
        ("uname", Variant::dynamic(uname_getter, None)),
        ("uname_prt", Variant::dynamic(uname_prt_getter, None)),
        ("time", Variant::dynamic(time_getter, None)),
        ("time_us", Variant::dynamic(time_us_getter, None)),
        ("locale", Variant::dynamic(locale_getter, Some(locale_setter))),
        (
            "timezone",
            Variant::dynamic(timezone_getter, Some(timezone_setter)),
        ),
        ("random", Variant::dynamic(random_getter, Some(random_setter))),
        ("cwd", Variant::dynamic(cwd_getter, Some(cwd_setter))),
        ("env", Variant::dynamic(env_getter, Some(env_setter))),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> Variant {
        make_system().get_by_key(name).unwrap()
    }

    #[test]
    fn test_const() {
        let c = member("const");
        let v = c.call_getter(&[Variant::string("HVML_SPEC_VERSION")]).unwrap();
        assert_eq!(v.as_str(), Some(HVML_SPEC_VERSION));
        assert!(c.call_getter(&[Variant::string("NO_SUCH_CONST")]).is_err());
    }

    #[test]
    fn test_time_is_recent() {
        let t = member("time").call_getter(&[]).unwrap();
        let secs = t.cast_to_ulongint(false).unwrap();
        // after 2020-01-01
        assert!(secs > 1_577_836_800);
    }

    #[test]
    fn test_time_us_forms() {
        let m = member("time_us");
        let ld = m.call_getter(&[]).unwrap();
        assert_eq!(ld.variant_type(), crate::variant::VariantType::LongDouble);

        let obj = m.call_getter(&[Variant::Boolean(false)]).unwrap();
        assert!(obj.get_by_key("sec").is_ok());
        assert!(obj.get_by_key("usec").is_ok());
    }

    #[test]
    fn test_uname_prt_subset() {
        let m = member("uname_prt");
        let one = m
            .call_getter(&[Variant::string("kernel-name")])
            .unwrap();
        let two = m
            .call_getter(&[Variant::string("kernel-name kernel-release")])
            .unwrap();
        let one = one.as_str().unwrap().to_string();
        let two = two.as_str().unwrap().to_string();
        assert!(!one.is_empty());
        assert!(two.starts_with(&one));
        assert_eq!(two.split_whitespace().count(), 2);
    }

    #[test]
    fn test_locale_set_get() {
        let m = member("locale");
        m.call_setter(&[Variant::string("collate"), Variant::string("en_US.UTF-8")])
            .unwrap();
        let v = m.call_getter(&[Variant::string("collate")]).unwrap();
        assert_eq!(v.as_str(), Some("en_US.UTF-8"));
    }

    #[test]
    fn test_timezone_set_get() {
        let m = member("timezone");
        m.call_setter(&[Variant::string("Asia/Shanghai")]).unwrap();
        let v = m.call_getter(&[]).unwrap();
        assert_eq!(v.as_str(), Some("Asia/Shanghai"));
        assert!(m.call_setter(&[Variant::string("")]).is_err());
    }

    #[test]
    fn test_random_seeded_reproducible() {
        let m = member("random");
        m.call_setter(&[Variant::ULongInt(42)]).unwrap();
        let a = m.call_getter(&[]).unwrap().numberify();
        m.call_setter(&[Variant::ULongInt(42)]).unwrap();
        let b = m.call_getter(&[]).unwrap().numberify();
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn test_random_upper_bound() {
        let m = member("random");
        let v = m.call_getter(&[Variant::Number(10.0)]).unwrap().numberify();
        assert!((0.0..10.0).contains(&v));
        assert!(m.call_getter(&[Variant::Number(-1.0)]).is_err());
    }

    #[test]
    fn test_env_roundtrip() {
        let m = member("env");
        m.call_setter(&[
            Variant::string("HVMLRT_TEST_ENV"),
            Variant::string("on"),
        ])
        .unwrap();
        assert_eq!(
            m.call_getter(&[Variant::string("HVMLRT_TEST_ENV")])
                .unwrap()
                .as_str(),
            Some("on")
        );

        m.call_setter(&[Variant::string("HVMLRT_TEST_ENV"), Variant::Undefined])
            .unwrap();
        assert!(m
            .call_getter(&[Variant::string("HVMLRT_TEST_ENV")])
            .unwrap()
            .is_undefined());
    }

    #[test]
    fn test_cwd_getter() {
        let m = member("cwd");
        let v = m.call_getter(&[]).unwrap();
        assert!(!v.as_str().unwrap().is_empty());
    }
}
