//! Unified error system for the runtime.
//!
//! Every failure is a `(kind, optional detail)` pair. Each thread also
//! carries a last-error slot so C-style "returns invalid, sets the error"
//! call sites have somewhere to put the triplet; element ops copy it into
//! the stack's `except` slot when they unwind.

use std::cell::RefCell;
use std::fmt;

/// Categorized error kinds. The names double as exception names for
/// `except:<Name>` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Ok,
    BadEncoding,
    BadHvmlTag,
    BadHvmlAttrName,
    BadHvmlAttrValue,
    BadHvmlContent,
    BadExpression,
    BadExecutor,
    BadName,
    NoData,
    NotIterable,
    BadIndex,
    NoSuchKey,
    DuplicateKey,
    ArgumentMissed,
    WrongDataType,
    InvalidValue,
    MaxIterationCount,
    MaxRecursionDepth,
    Unauthorized,
    Timeout,
    EdomFailure,
    LostRenderer,
    MemoryFailure,
    InternalFailure,
    ZeroDivision,
    Overflow,
    Underflow,
    InvalidFloat,
    AccessDenied,
    IoFailure,
    TooSmall,
    TooMany,
    TooLong,
    TooLarge,
    NotDesiredEntity,
    InvalidOperand,
    EntityNotFound,
    EntityExists,
    NoStorageSpace,
    BrokenPipe,
    ConnectionAborted,
    ConnectionRefused,
    ConnectionReset,
    NameResolutionFailed,
    RequestFailed,
    SystemFault,
    OsFailure,
    NotReady,
    NotImplemented,
    Unsupported,
    Incompleted,
    NotExists,
    Duplicated,
    DuplicateName,
}

impl ErrorKind {
    /// The exception name used for `except:<Name>` events and observer
    /// matching.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Ok => "OK",
            ErrorKind::BadEncoding => "BadEncoding",
            ErrorKind::BadHvmlTag => "BadHVMLTag",
            ErrorKind::BadHvmlAttrName => "BadHVMLAttrName",
            ErrorKind::BadHvmlAttrValue => "BadHVMLAttrValue",
            ErrorKind::BadHvmlContent => "BadHVMLContent",
            ErrorKind::BadExpression => "BadExpression",
            ErrorKind::BadExecutor => "BadExecutor",
            ErrorKind::BadName => "BadName",
            ErrorKind::NoData => "NoData",
            ErrorKind::NotIterable => "NotIterable",
            ErrorKind::BadIndex => "BadIndex",
            ErrorKind::NoSuchKey => "NoSuchKey",
            ErrorKind::DuplicateKey => "DuplicateKey",
            ErrorKind::ArgumentMissed => "ArgumentMissed",
            ErrorKind::WrongDataType => "WrongDataType",
            ErrorKind::InvalidValue => "InvalidValue",
            ErrorKind::MaxIterationCount => "MaxIterationCount",
            ErrorKind::MaxRecursionDepth => "MaxRecursionDepth",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::EdomFailure => "eDOMFailure",
            ErrorKind::LostRenderer => "LostRenderer",
            ErrorKind::MemoryFailure => "MemoryFailure",
            ErrorKind::InternalFailure => "InternalFailure",
            ErrorKind::ZeroDivision => "ZeroDivision",
            ErrorKind::Overflow => "Overflow",
            ErrorKind::Underflow => "Underflow",
            ErrorKind::InvalidFloat => "InvalidFloat",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::IoFailure => "IOFailure",
            ErrorKind::TooSmall => "TooSmall",
            ErrorKind::TooMany => "TooMany",
            ErrorKind::TooLong => "TooLong",
            ErrorKind::TooLarge => "TooLarge",
            ErrorKind::NotDesiredEntity => "NotDesiredEntity",
            ErrorKind::InvalidOperand => "InvalidOperand",
            ErrorKind::EntityNotFound => "EntityNotFound",
            ErrorKind::EntityExists => "EntityExists",
            ErrorKind::NoStorageSpace => "NoStorageSpace",
            ErrorKind::BrokenPipe => "BrokenPipe",
            ErrorKind::ConnectionAborted => "ConnectionAborted",
            ErrorKind::ConnectionRefused => "ConnectionRefused",
            ErrorKind::ConnectionReset => "ConnectionReset",
            ErrorKind::NameResolutionFailed => "NameResolutionFailed",
            ErrorKind::RequestFailed => "RequestFailed",
            ErrorKind::SystemFault => "SystemFault",
            ErrorKind::OsFailure => "OSFailure",
            ErrorKind::NotReady => "NotReady",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Incompleted => "Incompleted",
            ErrorKind::NotExists => "NotExists",
            ErrorKind::Duplicated => "Duplicated",
            ErrorKind::DuplicateName => "DuplicateName",
        }
    }
}

/// A runtime error: kind plus optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub detail: Option<Box<str>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, detail: None }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Error {
            kind,
            detail: Some(detail.into().into_boxed_str()),
        }
    }

    pub fn argument_missed(what: impl Into<String>) -> Self {
        Error::with_detail(ErrorKind::ArgumentMissed, what)
    }

    pub fn wrong_data_type(expected: &str, got: &str) -> Self {
        Error::with_detail(
            ErrorKind::WrongDataType,
            format!("expected {}, got {}", expected, got),
        )
    }

    pub fn invalid_value(what: impl Into<String>) -> Self {
        Error::with_detail(ErrorKind::InvalidValue, what)
    }

    pub fn bad_index(index: i64, len: usize) -> Self {
        Error::with_detail(
            ErrorKind::BadIndex,
            format!("index {} out of bounds for length {}", index, len),
        )
    }

    pub fn no_such_key(key: &str) -> Self {
        Error::with_detail(ErrorKind::NoSuchKey, format!("key '{}'", key))
    }

    pub fn not_found(name: &str) -> Self {
        Error::with_detail(ErrorKind::EntityNotFound, format!("name '{}'", name))
    }

    /// Attribute rejected because the element saw it twice.
    pub fn duplicated_attr(tag: &str, attr: &str) -> Self {
        Error::with_detail(
            ErrorKind::Duplicated,
            format!("attribute '{}' for element <{}>", attr, tag),
        )
    }

    /// Attribute rejected because its evaluated value is undefined/null.
    pub fn invalid_attr_value(tag: &str, attr: &str) -> Self {
        Error::with_detail(
            ErrorKind::InvalidValue,
            format!("attribute '{}' for element <{}> undefined", attr, tag),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(d) => write!(f, "{}: {}", self.kind.name(), d),
            None => write!(f, "{}", self.kind.name()),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = const { RefCell::new(None) };
}

/// Store the thread's last error. Returns the same kind for call chaining.
pub fn set_last_error(err: Error) -> ErrorKind {
    let kind = err.kind;
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
    kind
}

/// Peek at the thread's last error kind, `Ok` if clear.
pub fn last_error_kind() -> ErrorKind {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ErrorKind::Ok, |e| e.kind))
}

/// Take the thread's last error, clearing the slot.
pub fn take_last_error() -> Option<Error> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

pub fn clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}
