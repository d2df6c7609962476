//! # hvmlrt — the execution core of an HVML interpreter
//!
//! This crate turns a parsed HVML document tree into observable effects
//! on a live element tree, coordinating time, events, and multi-thread
//! message passing. Four subsystems carry the weight:
//!
//! 1. **variant** — a polymorphic, refcounted value model with
//!    containers, mutation listeners, and a two-heap move protocol for
//!    cross-thread transfer;
//! 2. **interp** — a stack-based cooperative executor, one frame per
//!    element, with a four-hook op table per tag and suspendable
//!    coroutines;
//! 3. **varmgr** — scoped variable managers with five-level name
//!    resolution and change/except observers;
//! 4. **msg** — per-instance message queues plus a process-wide
//!    move-buffer registry for request / response / event traffic,
//!    including broadcast.
//!
//! Timers bound to the document's `$TIMERS` set drive periodic events
//! into the coroutine. Parsing, the concrete DOM library, renderer
//! transports, and selector engines are external collaborators; only
//! their boundary contracts live here (`vdom::DomSink`, `rdr`).
//!
//! ## Quick start
//!
//! ```
//! use hvmlrt::interp::{Coroutine, Stack};
//! use hvmlrt::msg::MsgQueue;
//! use hvmlrt::varmgr::VarMgr;
//! use hvmlrt::variant::Variant;
//! use hvmlrt::vdom::{Document, ElementBuilder};
//! use std::sync::Arc;
//!
//! let root = ElementBuilder::new("iterate")
//!     .attr_value("on", Variant::array(vec![
//!         Variant::LongInt(3),
//!         Variant::LongInt(1),
//!         Variant::LongInt(2),
//!     ]))
//!     .attr("by", "RANGE: FROM 0")
//!     .build();
//!
//! let doc = Document::new(root);
//! let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
//! let mut co = Coroutine::new(stack);
//! co.run().unwrap();
//! ```

pub mod atom;
pub mod dvobjs;
pub mod error;
pub mod executor;
pub mod instance;
pub mod interp;
pub mod msg;
pub mod rdr;
pub mod timer;
pub mod varmgr;
pub mod variant;
pub mod vdom;

pub use error::{Error, ErrorKind, Result};
pub use instance::{
    cleanup, init, Modules, MODULE_ALL, MODULE_EJSON, MODULE_HVML, MODULE_UTILS, MODULE_VARIANT,
};
pub use interp::{Coroutine, CoroutineState, Stack};
pub use msg::{Message, MsgQueue};
pub use variant::{MoveVariant, Variant};
