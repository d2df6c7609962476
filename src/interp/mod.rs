//! The stack-based cooperative executor.
//!
//! One frame per active element. Element behaviour comes from a four-hook
//! op table (`after_pushed` / `select_child` / `rerun` / `on_popping`);
//! the engine in `coroutine` drives the frame stack, and `elements`
//! houses the per-tag op tables.

pub mod coroutine;
pub mod elements;
pub mod ops;

pub use coroutine::{Coroutine, CoroutineState};
pub use ops::ElementOps;

use crate::error::{Error, ErrorKind, Result};
use crate::msg::MsgQueue;
use crate::timer::TimerHub;
use crate::varmgr::VarMgr;
use crate::variant::Variant;
use crate::vdom::{AttrValue, Document, DomHandle, DomSink, ElementRef, NullSink};
use smallvec::SmallVec;
use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

pub const NR_SYMBOLS: usize = 7;

/// The seven per-frame symbol variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SymbolVar {
    /// `?` — result of the preceding operation
    Question = 0,
    /// `<` — input data
    LessThan = 1,
    /// `@` — pointed element
    At = 2,
    /// `!` — frame-local temporaries (an object)
    Exclamation = 3,
    /// `:` — current key
    Colon = 4,
    /// `=` — current context data
    Equal = 5,
    /// `%` — iteration counter
    Percent = 6,
}

impl SymbolVar {
    pub fn from_char(c: char) -> Option<SymbolVar> {
        match c {
            '?' => Some(SymbolVar::Question),
            '<' => Some(SymbolVar::LessThan),
            '@' => Some(SymbolVar::At),
            '!' => Some(SymbolVar::Exclamation),
            ':' => Some(SymbolVar::Colon),
            '=' => Some(SymbolVar::Equal),
            '%' => Some(SymbolVar::Percent),
            _ => None,
        }
    }
}

/// Document insertion modes; transitions happen as the structural
/// elements are entered and left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocMode {
    BeforeHvml,
    BeforeHead,
    InHead,
    AfterHead,
    InBody,
    AfterBody,
    AfterHvml,
}

/// One activation record.
pub struct Frame {
    pub pos: ElementRef,
    /// Per-element context; its Drop is the destroy hook.
    pub ctxt: Option<Box<dyn Any>>,
    pub ops: &'static dyn ElementOps,
    pub symbols: [Variant; NR_SYMBOLS],
    /// Evaluated attributes, an object keyed by attribute name.
    pub attr_vars: Variant,
    pub silently: bool,
    pub edom_target: Option<DomHandle>,
}

/// A registered `observe` interest living on the stack.
pub struct StackObserver {
    pub source: ObserveSource,
    pub event_type: Box<str>,
    pub sub_type: Option<Box<str>>,
    /// The observe element whose children run when the event arrives.
    pub pos: ElementRef,
}

pub enum ObserveSource {
    Variant(Variant),
    Named(Box<str>),
}

pub struct CancelRecord {
    pub id: u64,
    pub run: Box<dyn FnOnce()>,
}

/// The coroutine's execution stack plus everything scoped to it.
pub struct Stack {
    pub doc: Rc<Document>,
    /// Frame stack; inline storage covers typical document depth.
    pub frames: SmallVec<[Frame; 16]>,
    pub mode: DocMode,
    pub except: Option<Error>,
    /// Unwind-until-ancestor marker: frames above this index decline to
    /// select children while it is set.
    pub back_anchor: Option<usize>,
    pub observers: Vec<StackObserver>,
    pub cancels: Vec<CancelRecord>,
    pub timers: Option<TimerHub>,
    pub queue: Arc<MsgQueue>,
    pub dom: Rc<dyn DomSink>,
    pub inst_vars: VarMgr,
    next_cancel_id: u64,
}

impl Stack {
    pub fn new(doc: Rc<Document>, queue: Arc<MsgQueue>, inst_vars: VarMgr) -> Stack {
        // a standalone fragment (tests, observer subtrees) skips the
        // structural mode machine
        let mode = if &*doc.root.tag == "hvml" {
            DocMode::BeforeHvml
        } else {
            DocMode::InBody
        };
        Stack {
            doc,
            frames: SmallVec::new(),
            mode,
            except: None,
            back_anchor: None,
            observers: Vec::new(),
            cancels: Vec::new(),
            timers: None,
            queue,
            dom: Rc::new(NullSink),
            inst_vars,
            next_cancel_id: 1,
        }
    }

    pub fn with_dom(mut self, dom: Rc<dyn DomSink>) -> Stack {
        self.dom = dom;
        self
    }

    /// Create the timer hub, bind `$TIMERS`, and hook its stop routine
    /// into the cancel list.
    pub fn init_timers(&mut self) -> Result<()> {
        let hub = TimerHub::init(&self.doc.variables, Arc::clone(&self.queue))?;
        let canceller = hub.make_canceller();
        self.timers = Some(hub);
        self.register_cancel(canceller);
        Ok(())
    }

    // ── Frames ────────────────────────────────────────────────────

    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Take the top frame's context for exclusive use; pair with
    /// `put_ctxt`.
    pub fn take_ctxt<T: Any>(&mut self) -> Option<Box<T>> {
        let frame = self.frames.last_mut()?;
        let ctxt = frame.ctxt.take()?;
        match ctxt.downcast::<T>() {
            Ok(c) => Some(c),
            Err(c) => {
                frame.ctxt = Some(c);
                None
            }
        }
    }

    pub fn put_ctxt<T: Any>(&mut self, ctxt: Box<T>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ctxt = Some(ctxt);
        }
    }

    // ── Symbol variables ──────────────────────────────────────────

    /// Read a symbol variable, climbing `generation` parent frames
    /// first.
    pub fn get_symbol(&self, sym: SymbolVar, generation: usize) -> Result<Variant> {
        let depth = self.frames.len();
        if generation >= depth {
            return Err(Error::with_detail(
                ErrorKind::EntityNotFound,
                "symbol generation exceeds stack depth",
            ));
        }
        Ok(self.frames[depth - 1 - generation].symbols[sym as usize].clone())
    }

    pub fn set_symbol(&mut self, sym: SymbolVar, value: Variant) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::new(ErrorKind::InternalFailure))?;
        frame.symbols[sym as usize] = value;
        Ok(())
    }

    pub fn get_question(&self) -> Variant {
        self.get_symbol(SymbolVar::Question, 0)
            .unwrap_or(Variant::Undefined)
    }

    pub fn set_question(&mut self, value: Variant) -> Result<()> {
        self.set_symbol(SymbolVar::Question, value)
    }

    pub fn set_input(&mut self, value: Variant) -> Result<()> {
        self.set_symbol(SymbolVar::LessThan, value)
    }

    pub fn inc_percent(&mut self) -> Result<()> {
        let current = self
            .get_symbol(SymbolVar::Percent, 0)?
            .cast_to_longint(true)?;
        self.set_symbol(SymbolVar::Percent, Variant::LongInt(current + 1))
    }

    /// Anchor-qualified symbol lookup: walk parent frames for an element
    /// whose `id` attribute is `#<anchor>`.
    pub fn find_anchor_symbol(&mut self, anchor: &str, sym: SymbolVar) -> Result<Variant> {
        for i in (0..self.frames.len()).rev() {
            let pos = Rc::clone(&self.frames[i].pos);
            let Some(attr) = pos.attr("id").cloned() else {
                continue;
            };
            let id = eval_attr(self, &attr)?;
            if let Some(id) = id.as_str() {
                if let Some(stripped) = id.strip_prefix('#') {
                    if stripped == anchor {
                        return Ok(self.frames[i].symbols[sym as usize].clone());
                    }
                }
            }
        }
        Err(Error::with_detail(
            ErrorKind::EntityNotFound,
            format!("anchor '#{}'", anchor),
        ))
    }

    // ── Named variables ───────────────────────────────────────────

    /// Name resolution, bottom-up: frame `!` temporaries, element scope
    /// variables, document variables, instance variables. First hit
    /// wins.
    pub fn find_named_var(&self, name: &str) -> Result<Variant> {
        // 1. `!` temporaries, innermost frame first
        for frame in self.frames.iter().rev() {
            let tmp = &frame.symbols[SymbolVar::Exclamation as usize];
            if tmp.is_object() {
                if let Ok(v) = tmp.get_by_key(name) {
                    return Ok(v);
                }
            }
        }

        // 2. scope variables on enclosing elements
        if let Some(frame) = self.frames.last() {
            let mut elem = Some(Rc::clone(&frame.pos));
            while let Some(e) = elem {
                if let Some(vars) = e.existing_scope_variables() {
                    if let Ok(v) = vars.get(name) {
                        return Ok(v);
                    }
                }
                elem = e.parent();
            }
        }

        // 3. document variables
        if let Ok(v) = self.doc.variables.get(name) {
            return Ok(v);
        }

        // 4. instance variables
        if let Ok(v) = self.inst_vars.get(name) {
            return Ok(v);
        }

        Err(Error::not_found(name))
    }

    /// Bind a `!` temporary on the current frame.
    pub fn bind_temp_var(&mut self, name: &str, value: Variant) -> Result<()> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| Error::new(ErrorKind::InternalFailure))?;
        frame.symbols[SymbolVar::Exclamation as usize].set_by_key(name, value)
    }

    /// Unbind a name, trying temporaries, scope variables, then document
    /// variables.
    pub fn unbind_named_var(&mut self, name: &str) -> Result<()> {
        for frame in self.frames.iter().rev() {
            let tmp = &frame.symbols[SymbolVar::Exclamation as usize];
            if tmp.is_object() && tmp.get_by_key(name).is_ok() {
                tmp.remove_by_key(name, false)?;
                return Ok(());
            }
        }
        if let Some(frame) = self.frames.last() {
            let mut elem = Some(Rc::clone(&frame.pos));
            while let Some(e) = elem {
                if let Some(vars) = e.existing_scope_variables() {
                    if vars.get(name).is_ok() {
                        vars.remove(name, false)?;
                        return Ok(());
                    }
                }
                elem = e.parent();
            }
        }
        if self.doc.variables.get(name).is_ok() {
            self.doc.variables.remove(name, false)?;
            return Ok(());
        }
        Err(Error::not_found(name))
    }

    // ── Document modes ────────────────────────────────────────────

    /// Apply a mode transition; illegal transitions are programming
    /// errors.
    pub fn transit_mode(&mut self, to: DocMode) -> Result<()> {
        use DocMode::*;
        let legal = matches!(
            (self.mode, to),
            (BeforeHvml, BeforeHead)
                | (BeforeHead, InHead)
                | (InHead, AfterHead)
                | (BeforeHead, AfterHead)
                | (AfterHead, InBody)
                | (InBody, AfterBody)
                | (AfterBody, AfterHvml)
        );
        if !legal {
            debug_assert!(false, "illegal mode transition {:?} -> {:?}", self.mode, to);
            return Err(Error::with_detail(
                ErrorKind::InternalFailure,
                format!("illegal mode transition {:?} -> {:?}", self.mode, to),
            ));
        }
        self.mode = to;
        Ok(())
    }

    // ── Cancellation ──────────────────────────────────────────────

    pub fn register_cancel(&mut self, run: Box<dyn FnOnce()>) -> u64 {
        let id = self.next_cancel_id;
        self.next_cancel_id += 1;
        self.cancels.push(CancelRecord { id, run });
        id
    }

    pub fn unregister_cancel(&mut self, id: u64) -> bool {
        let before = self.cancels.len();
        self.cancels.retain(|c| c.id != id);
        self.cancels.len() != before
    }

    /// Run every registered cancel routine in reverse registration
    /// order.
    pub fn run_cancels(&mut self) {
        while let Some(record) = self.cancels.pop() {
            (record.run)();
        }
    }
}

/// Evaluate an attribute value against the running stack.
///
/// Literals starting with `$` resolve a symbol or named variable; other
/// literals parse as eJSON when well-formed and fall back to plain
/// strings.
pub fn eval_attr(stack: &mut Stack, value: &AttrValue) -> Result<Variant> {
    match value {
        AttrValue::Value(v) => Ok(v.clone()),
        AttrValue::Expr(f) => f(stack),
        AttrValue::Literal(s) => {
            if let Some(rest) = s.strip_prefix('$') {
                let mut chars = rest.chars();
                if let (Some(c), None) = (chars.next(), chars.next()) {
                    if let Some(sym) = SymbolVar::from_char(c) {
                        return stack.get_symbol(sym, 0);
                    }
                }
                return stack.find_named_var(rest);
            }
            match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json) => Ok(Variant::from_json(&json)),
                Err(_) => Ok(Variant::string(&**s)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::ElementBuilder;

    fn empty_stack(root_tag: &str) -> Stack {
        let doc = Document::new(ElementBuilder::new(root_tag).build());
        Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new())
    }

    fn base_frame(stack: &Stack) -> Frame {
        Frame {
            pos: Rc::clone(&stack.doc.root),
            ctxt: None,
            ops: ops::fallback_ops(),
            symbols: coroutine::fresh_symbols(),
            attr_vars: Variant::object(Vec::<(String, Variant)>::new()),
            silently: false,
            edom_target: None,
        }
    }

    #[test]
    fn test_symbol_from_char() {
        assert_eq!(SymbolVar::from_char('?'), Some(SymbolVar::Question));
        assert_eq!(SymbolVar::from_char('%'), Some(SymbolVar::Percent));
        assert_eq!(SymbolVar::from_char('x'), None);
    }

    #[test]
    fn test_symbol_generation_walks_parents() {
        let mut stack = empty_stack("div");
        let f0 = base_frame(&stack);
        stack.frames.push(f0);
        stack.set_question(Variant::LongInt(1)).unwrap();

        let f1 = base_frame(&stack);
        stack.frames.push(f1);
        stack.set_question(Variant::LongInt(2)).unwrap();

        assert_eq!(
            stack.get_symbol(SymbolVar::Question, 0).unwrap(),
            Variant::LongInt(2)
        );
        assert_eq!(
            stack.get_symbol(SymbolVar::Question, 1).unwrap(),
            Variant::LongInt(1)
        );
        assert!(stack.get_symbol(SymbolVar::Question, 2).is_err());
    }

    #[test]
    fn test_named_resolution_order() {
        let mut stack = empty_stack("div");
        stack.inst_vars.add("x", Variant::string("instance")).unwrap();
        stack.doc.variables.add("x", Variant::string("document")).unwrap();

        // document beats instance
        let frame = base_frame(&stack);
        stack.frames.push(frame);
        assert_eq!(
            stack.find_named_var("x").unwrap(),
            Variant::string("document")
        );

        // element scope beats document
        stack
            .doc
            .root
            .scope_variables()
            .add("x", Variant::string("scope"))
            .unwrap();
        assert_eq!(stack.find_named_var("x").unwrap(), Variant::string("scope"));

        // frame temporaries beat everything
        stack.bind_temp_var("x", Variant::string("temp")).unwrap();
        assert_eq!(stack.find_named_var("x").unwrap(), Variant::string("temp"));
    }

    #[test]
    fn test_unbind_walks_levels() {
        let mut stack = empty_stack("div");
        stack.doc.variables.add("y", Variant::LongInt(9)).unwrap();
        let frame = base_frame(&stack);
        stack.frames.push(frame);

        stack.unbind_named_var("y").unwrap();
        assert!(stack.find_named_var("y").is_err());
        assert!(stack.unbind_named_var("y").is_err());
    }

    #[test]
    fn test_mode_machine_legal_chain() {
        let mut stack = empty_stack("hvml");
        assert_eq!(stack.mode, DocMode::BeforeHvml);
        stack.transit_mode(DocMode::BeforeHead).unwrap();
        stack.transit_mode(DocMode::InHead).unwrap();
        stack.transit_mode(DocMode::AfterHead).unwrap();
        stack.transit_mode(DocMode::InBody).unwrap();
        stack.transit_mode(DocMode::AfterBody).unwrap();
        stack.transit_mode(DocMode::AfterHvml).unwrap();
    }

    #[test]
    #[should_panic(expected = "illegal mode transition")]
    fn test_mode_machine_illegal() {
        let mut stack = empty_stack("hvml");
        let _ = stack.transit_mode(DocMode::InBody);
    }

    #[test]
    fn test_standalone_root_skips_modes() {
        let stack = empty_stack("iterate");
        assert_eq!(stack.mode, DocMode::InBody);
    }

    #[test]
    fn test_cancel_records_run_in_reverse() {
        use std::cell::RefCell;
        let order: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let mut stack = empty_stack("div");

        for n in [1u32, 2, 3] {
            let seen = order.clone();
            stack.register_cancel(Box::new(move || seen.borrow_mut().push(n)));
        }
        stack.run_cancels();
        assert_eq!(&*order.borrow(), &[3, 2, 1]);
    }

    #[test]
    fn test_unregister_cancel() {
        let mut stack = empty_stack("div");
        let id = stack.register_cancel(Box::new(|| {}));
        assert!(stack.unregister_cancel(id));
        assert!(!stack.unregister_cancel(id));
    }

    #[test]
    fn test_eval_attr_literals() {
        let mut stack = empty_stack("div");
        let frame = base_frame(&stack);
        stack.frames.push(frame);
        stack.set_question(Variant::LongInt(42)).unwrap();

        let json = eval_attr(&mut stack, &AttrValue::Literal(Rc::from("1000"))).unwrap();
        assert_eq!(json, Variant::LongInt(1000));

        let plain = eval_attr(&mut stack, &AttrValue::Literal(Rc::from("RANGE: FROM 0"))).unwrap();
        assert_eq!(plain, Variant::string("RANGE: FROM 0"));

        let sym = eval_attr(&mut stack, &AttrValue::Literal(Rc::from("$?"))).unwrap();
        assert_eq!(sym, Variant::LongInt(42));

        stack.doc.variables.add("list", Variant::array(vec![])).unwrap();
        let named = eval_attr(&mut stack, &AttrValue::Literal(Rc::from("$list"))).unwrap();
        assert!(named.is_array());
    }

    #[test]
    fn test_anchor_symbol_lookup() {
        let root = ElementBuilder::new("div")
            .attr("id", "#outer")
            .child(ElementBuilder::new("span"))
            .build();
        let inner = root.child_elements()[0].clone();
        let doc = Document::new(Rc::clone(&root));
        let mut stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());

        let mut f0 = Frame {
            pos: root,
            ctxt: None,
            ops: ops::fallback_ops(),
            symbols: coroutine::fresh_symbols(),
            attr_vars: Variant::object(Vec::<(String, Variant)>::new()),
            silently: false,
            edom_target: None,
        };
        f0.symbols[SymbolVar::Question as usize] = Variant::string("outer-result");
        stack.frames.push(f0);

        let f1 = Frame {
            pos: inner,
            ctxt: None,
            ops: ops::fallback_ops(),
            symbols: coroutine::fresh_symbols(),
            attr_vars: Variant::object(Vec::<(String, Variant)>::new()),
            silently: false,
            edom_target: None,
        };
        stack.frames.push(f1);

        let v = stack.find_anchor_symbol("outer", SymbolVar::Question).unwrap();
        assert_eq!(v, Variant::string("outer-result"));
        assert!(stack.find_anchor_symbol("missing", SymbolVar::Question).is_err());
    }
}
