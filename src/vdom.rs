//! The parsed document tree the executor walks.
//!
//! Parsing is out of scope; hosts (and tests) construct trees through
//! `ElementBuilder`. Attribute values are either literal text, a prebuilt
//! variant, or a closure evaluated against the running stack, because the
//! expression language itself is an external collaborator.
//!
//! `DomSink` is the boundary to the live element tree: the erase element
//! emits its mutations through it and never touches a DOM directly.

use crate::error::Result;
use crate::varmgr::VarMgr;
use crate::variant::Variant;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub type ElementRef = Rc<Element>;

/// Attribute-value closure, evaluated against the running stack each time
/// the attribute is (re-)read.
pub type AttrExprFn = Rc<dyn Fn(&mut crate::interp::Stack) -> Result<Variant>>;

#[derive(Clone)]
pub enum AttrValue {
    Literal(Rc<str>),
    Value(Variant),
    Expr(AttrExprFn),
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Literal(s) => write!(f, "Literal({:?})", s),
            AttrValue::Value(v) => write!(f, "Value({:?})", v),
            AttrValue::Expr(_) => write!(f, "Expr(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub name: Box<str>,
    pub value: AttrValue,
}

#[derive(Clone)]
pub enum Node {
    Element(ElementRef),
    Content(Rc<str>),
    Comment(Rc<str>),
}

pub struct Element {
    pub tag: Box<str>,
    pub attrs: Vec<Attr>,
    pub children: RefCell<Vec<Node>>,
    pub parent: RefCell<Weak<Element>>,
    scope_vars: RefCell<Option<VarMgr>>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|a| &*a.name == name)
            .map(|a| &a.value)
    }

    pub fn parent(&self) -> Option<ElementRef> {
        self.parent.borrow().upgrade()
    }

    /// The element's scope variable manager, created on first use.
    pub fn scope_variables(&self) -> VarMgr {
        let mut slot = self.scope_vars.borrow_mut();
        slot.get_or_insert_with(VarMgr::new).clone()
    }

    /// Scope variables if any were ever bound here.
    pub fn existing_scope_variables(&self) -> Option<VarMgr> {
        self.scope_vars.borrow().clone()
    }

    pub fn child_elements(&self) -> Vec<ElementRef> {
        self.children
            .borrow()
            .iter()
            .filter_map(|n| match n {
                Node::Element(e) => Some(Rc::clone(e)),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} attrs={}>", self.tag, self.attrs.len())
    }
}

/// Fluent constructor for document trees.
pub struct ElementBuilder {
    tag: Box<str>,
    attrs: Vec<Attr>,
    children: Vec<BuilderNode>,
}

enum BuilderNode {
    Element(ElementBuilder),
    Content(String),
    Comment(String),
}

impl ElementBuilder {
    pub fn new(tag: &str) -> ElementBuilder {
        ElementBuilder {
            tag: Box::from(tag),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, literal: &str) -> Self {
        self.attrs.push(Attr {
            name: Box::from(name),
            value: AttrValue::Literal(Rc::from(literal)),
        });
        self
    }

    pub fn attr_value(mut self, name: &str, value: Variant) -> Self {
        self.attrs.push(Attr {
            name: Box::from(name),
            value: AttrValue::Value(value),
        });
        self
    }

    pub fn attr_expr(mut self, name: &str, f: AttrExprFn) -> Self {
        self.attrs.push(Attr {
            name: Box::from(name),
            value: AttrValue::Expr(f),
        });
        self
    }

    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.children.push(BuilderNode::Element(child));
        self
    }

    pub fn content(mut self, text: &str) -> Self {
        self.children.push(BuilderNode::Content(text.to_string()));
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.children.push(BuilderNode::Comment(text.to_string()));
        self
    }

    pub fn build(self) -> ElementRef {
        let element = Rc::new(Element {
            tag: self.tag,
            attrs: self.attrs,
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            scope_vars: RefCell::new(None),
        });
        for node in self.children {
            let built = match node {
                BuilderNode::Element(b) => {
                    let child = b.build();
                    *child.parent.borrow_mut() = Rc::downgrade(&element);
                    Node::Element(child)
                }
                BuilderNode::Content(s) => Node::Content(Rc::from(&*s)),
                BuilderNode::Comment(s) => Node::Comment(Rc::from(&*s)),
            };
            element.children.borrow_mut().push(built);
        }
        element
    }
}

/// A parsed document: the root element plus the document-level variable
/// manager (`$TIMERS` and the other built-ins bind here).
pub struct Document {
    pub root: ElementRef,
    pub variables: VarMgr,
}

impl Document {
    pub fn new(root: ElementRef) -> Rc<Document> {
        Rc::new(Document {
            root,
            variables: VarMgr::new(),
        })
    }
}

/// Handle into the host's live element tree.
pub type DomHandle = u64;

/// The abstract sink for mutations on the live element tree. The concrete
/// DOM library and its selector engines live outside the core.
pub trait DomSink {
    /// Resolve a CSS selector to element handles.
    fn select(&self, css: &str) -> Vec<DomHandle>;
    /// Erase an element. True when it existed.
    fn erase_element(&self, handle: DomHandle) -> bool;
    /// Remove one attribute. True when the attribute existed.
    fn remove_attribute(&self, handle: DomHandle, name: &str) -> bool;
}

/// A sink that matches nothing; the default when a stack has no renderer
/// document attached.
pub struct NullSink;

impl DomSink for NullSink {
    fn select(&self, _css: &str) -> Vec<DomHandle> {
        Vec::new()
    }
    fn erase_element(&self, _handle: DomHandle) -> bool {
        false
    }
    fn remove_attribute(&self, _handle: DomHandle, _name: &str) -> bool {
        false
    }
}


impl Element {
    /// Identity comparison helper for tests and anchor search.
    pub fn ptr_eq_element(self: &Rc<Self>, other: &Rc<Element>) -> bool {
        Rc::ptr_eq(self, other)
    }
}
