//! Instance lifecycle.
//!
//! One instance per OS thread: app/runner names, endpoint atom, the
//! instance-level variable manager, and (once a move buffer is created)
//! the message queue registered in the process-wide table. Global state
//! is limited to the once-guarded module initialisation, the live
//! (app, runner) registry, the atom table, and the move heap.

use crate::atom::{self, Atom, Bucket};
use crate::error::{Error, ErrorKind, Result};
use crate::msg::{self, Message, MoveBufferFlags, MsgQueue};
use crate::varmgr::VarMgr;
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::sync::{Mutex, Once, OnceLock};
use tracing::{debug, info};

/// Module selection bits for `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modules(pub u32);

pub const MODULE_UTILS: Modules = Modules(0x0001);
pub const MODULE_VARIANT: Modules = Modules(0x0003);
pub const MODULE_EJSON: Modules = Modules(0x0007);
pub const MODULE_HVML: Modules = Modules(0x001f);
pub const MODULE_ALL: Modules = Modules(0xffff);

impl Modules {
    fn covers(self, required: Modules) -> bool {
        self.0 & required.0 == required.0
    }
}

struct Module {
    name: &'static str,
    required: Modules,
    init_once: fn(),
}

fn except_atoms_init() {
    use crate::error::ErrorKind::*;
    // intern every exception name so except events compare by atom
    let kinds = [
        Ok, BadEncoding, BadHvmlTag, BadHvmlAttrName, BadHvmlAttrValue, BadHvmlContent,
        BadExpression, BadExecutor, BadName, NoData, NotIterable, BadIndex, NoSuchKey,
        DuplicateKey, ArgumentMissed, WrongDataType, InvalidValue, MaxIterationCount,
        MaxRecursionDepth, Unauthorized, Timeout, EdomFailure, LostRenderer, MemoryFailure,
        InternalFailure, ZeroDivision, Overflow, Underflow, InvalidFloat, AccessDenied,
        IoFailure, TooSmall, TooMany, TooLong, TooLarge, NotDesiredEntity, InvalidOperand,
        EntityNotFound, EntityExists, NoStorageSpace, BrokenPipe, ConnectionAborted,
        ConnectionRefused, ConnectionReset, NameResolutionFailed, RequestFailed, SystemFault,
        OsFailure, NotReady, NotImplemented, Unsupported, Incompleted, NotExists, Duplicated,
        DuplicateName,
    ];
    for kind in kinds {
        atom::intern(Bucket::Except, kind.name());
    }
}

fn executor_init() {
    // touching the registry seeds the built-in RANGE executor
    let _ = crate::executor::executor_for_rule("RANGE: FROM 0");
}

static MODULES: &[Module] = &[
    Module {
        name: "except",
        required: MODULE_UTILS,
        init_once: except_atoms_init,
    },
    Module {
        name: "executor",
        required: MODULE_HVML,
        init_once: executor_init,
    },
];

pub struct Instance {
    pub app: Box<str>,
    pub runner: Box<str>,
    pub endpoint: Atom,
    pub variables: VarMgr,
    queue: Option<std::sync::Arc<MsgQueue>>,
}

thread_local! {
    static INSTANCE: RefCell<Option<Instance>> = const { RefCell::new(None) };
}

fn live_runners() -> &'static Mutex<FxHashSet<(Box<str>, Box<str>)>> {
    static LIVE: OnceLock<Mutex<FxHashSet<(Box<str>, Box<str>)>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(FxHashSet::default()))
}

static INIT: Once = Once::new();

fn init_once(modules: Modules) {
    INIT.call_once(|| {
        for m in MODULES {
            if modules.covers(m.required) {
                debug!(module = m.name, "module init");
                (m.init_once)();
            }
        }
    });
}

pub fn endpoint_name(app: &str, runner: &str) -> String {
    format!("edpt://localhost/{}/{}", app, runner)
}

/// Initialise the runtime for the current thread.
///
/// Runs the one-shot global initialisation under a once-guard, then
/// creates the thread-local instance with its endpoint atom. A live
/// `(app, runner)` pair elsewhere in the process is rejected with
/// DuplicateName; a second init on the same thread with Duplicated.
pub fn init(modules: Modules, app: &str, runner: &str) -> Result<()> {
    init_once(modules);

    let already = INSTANCE.with(|slot| slot.borrow().is_some());
    if already {
        return Err(Error::new(ErrorKind::Duplicated));
    }

    {
        let mut live = live_runners().lock().unwrap();
        let key = (Box::from(app), Box::from(runner));
        if live.contains(&key) {
            return Err(Error::with_detail(
                ErrorKind::DuplicateName,
                format!("app '{}' runner '{}' already live", app, runner),
            ));
        }
        live.insert(key);
    }

    let endpoint = atom::intern(Bucket::Endpoint, &endpoint_name(app, runner));
    let variables = VarMgr::new();
    variables.add("SYSTEM", crate::dvobjs::make_system())?;

    INSTANCE.with(|slot| {
        *slot.borrow_mut() = Some(Instance {
            app: Box::from(app),
            runner: Box::from(runner),
            endpoint,
            variables,
            queue: None,
        });
    });
    info!(app, runner, "instance initialised");
    Ok(())
}

/// Tear the current thread's instance down, reversing init: the move
/// buffer (if any) is destroyed, the runner deregistered. Returns false
/// when no instance was live.
pub fn cleanup() -> bool {
    let inst = INSTANCE.with(|slot| slot.borrow_mut().take());
    let Some(inst) = inst else {
        return false;
    };
    if inst.queue.is_some() {
        let _ = msg::destroy_move_buffer(inst.endpoint);
    }
    live_runners()
        .lock()
        .unwrap()
        .remove(&(inst.app.clone(), inst.runner.clone()));
    info!(app = &*inst.app, runner = &*inst.runner, "instance cleaned up");
    true
}

/// Run `f` against the current instance.
pub fn with_current<R>(f: impl FnOnce(&mut Instance) -> R) -> Result<R> {
    INSTANCE.with(|slot| {
        let mut borrow = slot.borrow_mut();
        borrow
            .as_mut()
            .map(f)
            .ok_or_else(|| Error::with_detail(ErrorKind::NotReady, "no instance on this thread"))
    })
}

pub fn current_endpoint() -> Result<Atom> {
    with_current(|inst| inst.endpoint)
}

/// The current instance's variable manager (cross-document globals).
pub fn current_variables() -> Result<VarMgr> {
    with_current(|inst| inst.variables.clone())
}

// ── Move-buffer wrappers bound to the current instance ───────────────

pub fn inst_create_move_buffer(flags: MoveBufferFlags, max_hint: usize) -> Result<Atom> {
    with_current(|inst| {
        if inst.queue.is_some() {
            return Err(Error::new(ErrorKind::Duplicated));
        }
        let queue = msg::create_move_buffer(inst.endpoint, flags, max_hint)?;
        inst.queue = Some(queue);
        Ok(inst.endpoint)
    })?
}

pub fn inst_destroy_move_buffer() -> Result<usize> {
    with_current(|inst| {
        if inst.queue.take().is_none() {
            return Err(Error::new(ErrorKind::EntityNotFound));
        }
        msg::destroy_move_buffer(inst.endpoint)
    })?
}

/// The current instance's queue, for wiring coroutines.
pub fn inst_queue() -> Result<std::sync::Arc<MsgQueue>> {
    with_current(|inst| {
        inst.queue
            .clone()
            .ok_or_else(|| Error::with_detail(ErrorKind::NotReady, "no move buffer"))
    })?
}

pub fn inst_move_message(target: Atom, msg: &Message) -> usize {
    let from = current_endpoint().unwrap_or(Atom::INVALID);
    msg::move_message(from, target, msg)
}

pub fn inst_holding_messages_count() -> Result<usize> {
    Ok(inst_queue()?.count())
}

pub fn inst_retrieve_message(idx: usize) -> Result<Option<Message>> {
    Ok(inst_queue()?.retrieve(idx))
}

pub fn inst_take_away_message(idx: usize) -> Result<Option<Message>> {
    Ok(inst_queue()?.take_away(idx))
}
