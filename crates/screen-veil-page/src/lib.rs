#![warn(missing_docs)]
//! # screen-veil-page
//!
//! ## Purpose
//! Models the untrusted host page the recorder is injected into.
//!
//! ## Responsibilities
//! - Hold the element tree with tags, ids, class lists, and attributes.
//! - Resolve mask-rule selectors against the tree ([`Page::query_selector_all`]).
//! - Track global event listeners, mutation observers, injected stylesheets,
//!   and shadow roots so teardown can be verified.
//! - Provide the page-wide slot where the live injection registers its
//!   teardown hook.
//!
//! ## Data flow
//! The browser shim mirrors DOM changes into [`Page`]; components mutate it
//! through the same API; the shim replays class/attribute changes onto the
//! real document.
//!
//! ## Ownership and lifetimes
//! Elements live in an arena addressed by [`ElementId`]. Removed elements
//! leave a tombstone, so stale ids resolve to "not found" instead of aliasing
//! a newer element.
//!
//! ## Error model
//! Structural mistakes (appending into a removed node, creating a cycle)
//! return [`PageError`]. Reads and class/attribute writes on removed elements
//! are silent no-ops, matching detached-node behavior in a browser.
//!
//! ## Security and privacy notes
//! The page model never stores text content or input values, only structure.

mod selector;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use url::Url;

pub use selector::{SelectorError, SelectorList};
use selector::{Combinator, ComplexSelector, Compound};

/// Handle to one element in the page arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(usize);

/// Handle to one registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Handle to one mutation observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

/// Global events the recorder listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pointer entered an element.
    MouseOver,
    /// Pointer left an element.
    MouseOut,
    /// Pointer button pressed.
    MouseDown,
    /// Click completed.
    Click,
    /// Key pressed.
    KeyDown,
    /// Key released.
    KeyUp,
    /// Window is about to unload.
    BeforeUnload,
}

/// Listener dispatch phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
    /// Runs before the target's own handlers.
    Capture,
    /// Runs after the target's own handlers.
    Bubble,
}

/// Registered listener record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerRecord {
    /// Listener handle.
    pub id: ListenerId,
    /// Event kind.
    pub kind: EventKind,
    /// Dispatch phase.
    pub phase: ListenerPhase,
}

/// Pointer event delivered to page listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    /// Element under the pointer.
    pub target: ElementId,
    /// Viewport x coordinate.
    pub client_x: i32,
    /// Viewport y coordinate.
    pub client_y: i32,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl PointerEvent {
    /// Creates an event at viewport position `(client_x, client_y)`.
    pub fn new(target: ElementId, client_x: i32, client_y: i32) -> Self {
        Self {
            target,
            client_x,
            client_y,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    /// Suppresses the browser's default action.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Keeps the event from reaching later listeners and page handlers.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Returns `true` after [`PointerEvent::prevent_default`].
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Returns `true` after [`PointerEvent::stop_propagation`].
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Keyboard event delivered to page listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Key name (`"Alt"`, `"a"`, ...).
    pub key: String,
    /// `true` for auto-repeat events while the key stays down.
    pub repeat: bool,
}

impl KeyEvent {
    /// Creates a non-repeat key event.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            repeat: false,
        }
    }

    /// Creates an auto-repeat key event.
    pub fn repeated(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            repeat: true,
        }
    }
}

/// Isolated style scope attached to a host element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowRoot {
    /// Stylesheet visible only inside the shadow root.
    pub stylesheet: String,
    /// Rendered markup inside the shadow root.
    pub markup: String,
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    shadow: Option<ShadowRoot>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            shadow: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ObserverRecord {
    id: ObserverId,
    root: ElementId,
    pending: usize,
}

/// Callback registered by the live injection; run by the next one.
pub type TeardownHook = Box<dyn FnOnce()>;

/// In-memory host page.
pub struct Page {
    url: Url,
    nodes: Vec<Option<Node>>,
    document_element: ElementId,
    head: ElementId,
    body: ElementId,
    listeners: Vec<ListenerRecord>,
    observers: Vec<ObserverRecord>,
    styles: BTreeMap<String, String>,
    teardown_hook: Option<TeardownHook>,
    next_handle: u64,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.url.as_str())
            .field("elements", &self.nodes.iter().flatten().count())
            .field("listeners", &self.listeners.len())
            .field("observers", &self.observers.len())
            .field("teardown_hook", &self.teardown_hook.is_some())
            .finish()
    }
}

impl Page {
    /// Creates an empty `<html><head/><body/></html>` document at `url`.
    ///
    /// # Errors
    /// Returns [`PageError::InvalidUrl`] when `url` does not parse.
    pub fn new(url: &str) -> Result<Self, PageError> {
        let url = Url::parse(url).map_err(|error| PageError::InvalidUrl(error.to_string()))?;

        let mut page = Self {
            url,
            nodes: Vec::new(),
            document_element: ElementId(0),
            head: ElementId(0),
            body: ElementId(0),
            listeners: Vec::new(),
            observers: Vec::new(),
            styles: BTreeMap::new(),
            teardown_hook: None,
            next_handle: 1,
        };

        let html = page.create_element("html");
        let head = page.create_element("head");
        let body = page.create_element("body");
        page.link(html, head);
        page.link(html, body);
        page.document_element = html;
        page.head = head;
        page.body = body;
        Ok(page)
    }

    /// Returns the page URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the `<html>` element.
    pub fn document_element(&self) -> ElementId {
        self.document_element
    }

    /// Returns the `<head>` element.
    pub fn head(&self) -> ElementId {
        self.head
    }

    /// Returns the `<body>` element.
    pub fn body(&self) -> ElementId {
        self.body
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Some(Node::new(tag)));
        id
    }

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    ///
    /// # Errors
    /// Returns [`PageError::UnknownElement`] for removed handles and
    /// [`PageError::HierarchyRequest`] when `child` is `parent` or one of its
    /// ancestors.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), PageError> {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return Err(PageError::UnknownElement);
        }
        if self.contains(child, parent) {
            return Err(PageError::HierarchyRequest);
        }

        self.detach(child);
        self.link(parent, child);
        self.record_mutation(parent);
        Ok(())
    }

    /// Removes `element` and its subtree from the page.
    ///
    /// Returns `false` when the element was already gone.
    pub fn remove(&mut self, element: ElementId) -> bool {
        if element == self.document_element || self.node(element).is_none() {
            return false;
        }

        let parent = self.node(element).and_then(|node| node.parent);
        self.detach(element);

        let mut stack = vec![element];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }

        if let Some(parent) = parent {
            self.record_mutation(parent);
        }
        true
    }

    /// Returns `true` while `element` has not been removed.
    pub fn exists(&self, element: ElementId) -> bool {
        self.node(element).is_some()
    }

    /// Returns `true` when `element` is reachable from `<html>`.
    pub fn is_connected(&self, element: ElementId) -> bool {
        self.contains(self.document_element, element)
    }

    /// Lower-case tag name.
    pub fn tag(&self, element: ElementId) -> Option<&str> {
        self.node(element).map(|node| node.tag.as_str())
    }

    /// Value of the `id` attribute when present and non-empty.
    pub fn element_id(&self, element: ElementId) -> Option<&str> {
        self.attribute(element, "id").filter(|id| !id.is_empty())
    }

    /// Sets the `id` attribute.
    pub fn set_element_id(&mut self, element: ElementId, id: &str) {
        self.set_attribute(element, "id", id);
    }

    /// Parent element, `None` for `<html>` and detached roots.
    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.node(element).and_then(|node| node.parent)
    }

    /// Child elements in document order.
    pub fn children(&self, element: ElementId) -> &[ElementId] {
        self.node(element)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Siblings that come before `element` under the same parent.
    pub fn previous_siblings(&self, element: ElementId) -> &[ElementId] {
        let Some(parent) = self.parent(element) else {
            return &[];
        };
        let siblings = self.children(parent);
        let position = siblings
            .iter()
            .position(|sibling| *sibling == element)
            .unwrap_or(0);
        &siblings[..position]
    }

    /// Returns `true` when `descendant` is `ancestor` or inside it.
    pub fn contains(&self, ancestor: ElementId, descendant: ElementId) -> bool {
        let mut current = Some(descendant);
        while let Some(element) = current {
            if self.node(element).is_none() {
                return false;
            }
            if element == ancestor {
                return true;
            }
            current = self.parent(element);
        }
        false
    }

    /// Class list in insertion order.
    pub fn classes(&self, element: ElementId) -> &[String] {
        self.node(element)
            .map(|node| node.classes.as_slice())
            .unwrap_or(&[])
    }

    /// Returns `true` when the class is present.
    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.classes(element).iter().any(|existing| existing == class)
    }

    /// Adds a class if missing. Returns `true` when the list changed.
    pub fn add_class(&mut self, element: ElementId, class: &str) -> bool {
        match self.node_mut(element) {
            Some(node) if !node.classes.iter().any(|existing| existing == class) => {
                node.classes.push(class.to_string());
                true
            }
            _ => false,
        }
    }

    /// Removes a class if present. Returns `true` when the list changed.
    pub fn remove_class(&mut self, element: ElementId, class: &str) -> bool {
        match self.node_mut(element) {
            Some(node) => {
                let before = node.classes.len();
                node.classes.retain(|existing| existing != class);
                node.classes.len() != before
            }
            None => false,
        }
    }

    /// Attribute value.
    pub fn attribute(&self, element: ElementId, name: &str) -> Option<&str> {
        self.node(element)
            .and_then(|node| node.attributes.get(name))
            .map(String::as_str)
    }

    /// Sets an attribute. `class` is routed to the class list.
    pub fn set_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        if name == "class" {
            if let Some(node) = self.node_mut(element) {
                node.classes = value.split_whitespace().map(str::to_string).collect();
            }
            return;
        }
        if let Some(node) = self.node_mut(element) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// Removes an attribute.
    pub fn remove_attribute(&mut self, element: ElementId, name: &str) {
        if let Some(node) = self.node_mut(element) {
            node.attributes.remove(name);
        }
    }

    /// Effective `type` of an `<input>`; `None` for other elements.
    pub fn input_type(&self, element: ElementId) -> Option<&str> {
        if self.tag(element)? != "input" {
            return None;
        }
        Some(
            self.attribute(element, "type")
                .filter(|value| !value.is_empty())
                .unwrap_or("text"),
        )
    }

    /// Elements in document order, starting at `<html>`.
    pub fn document_order(&self) -> Vec<ElementId> {
        let mut ordered = Vec::new();
        let mut stack = vec![self.document_element];
        while let Some(element) = stack.pop() {
            ordered.push(element);
            stack.extend(self.children(element).iter().rev().copied());
        }
        ordered
    }

    /// Connected elements carrying `class`, in document order.
    pub fn elements_with_class(&self, class: &str) -> Vec<ElementId> {
        self.document_order()
            .into_iter()
            .filter(|element| self.has_class(*element, class))
            .collect()
    }

    /// Connected elements carrying attribute `name`, in document order.
    pub fn elements_with_attribute(&self, name: &str) -> Vec<ElementId> {
        self.document_order()
            .into_iter()
            .filter(|element| self.attribute(*element, name).is_some())
            .collect()
    }

    /// First connected element whose id equals `id`.
    pub fn get_element_by_id(&self, id: &str) -> Option<ElementId> {
        self.document_order()
            .into_iter()
            .find(|element| self.element_id(*element) == Some(id))
    }

    /// Connected elements matching `selector`, in document order.
    ///
    /// # Errors
    /// Returns [`SelectorError`] when the selector does not parse.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .document_order()
            .into_iter()
            .filter(|element| self.matches_list(*element, &list))
            .collect())
    }

    /// Returns `true` when `element` matches `selector`.
    ///
    /// # Errors
    /// Returns [`SelectorError`] when the selector does not parse.
    pub fn matches(&self, element: ElementId, selector: &str) -> Result<bool, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(self.matches_list(element, &list))
    }

    fn matches_list(&self, element: ElementId, list: &SelectorList) -> bool {
        list.selectors
            .iter()
            .any(|complex| self.matches_complex(element, complex, complex.compounds.len() - 1))
    }

    fn matches_complex(&self, element: ElementId, complex: &ComplexSelector, index: usize) -> bool {
        if !self.matches_compound(element, &complex.compounds[index]) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match complex.combinators[index - 1] {
            Combinator::Child => self
                .parent(element)
                .is_some_and(|parent| self.matches_complex(parent, complex, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = self.parent(element);
                while let Some(candidate) = ancestor {
                    if self.matches_complex(candidate, complex, index - 1) {
                        return true;
                    }
                    ancestor = self.parent(candidate);
                }
                false
            }
        }
    }

    fn matches_compound(&self, element: ElementId, compound: &Compound) -> bool {
        let Some(tag) = self.tag(element) else {
            return false;
        };
        if compound.tag.as_deref().is_some_and(|expected| expected != tag) {
            return false;
        }
        if let Some(id) = &compound.id
            && self.element_id(element) != Some(id.as_str())
        {
            return false;
        }
        if !compound
            .classes
            .iter()
            .all(|class| self.has_class(element, class))
        {
            return false;
        }
        if let Some(expected) = compound.nth_of_type {
            return self.nth_of_type(element) == expected;
        }
        true
    }

    /// 1-based position among siblings sharing the element's tag.
    pub fn nth_of_type(&self, element: ElementId) -> usize {
        let tag = self.tag(element);
        1 + self
            .previous_siblings(element)
            .iter()
            .filter(|sibling| self.tag(**sibling) == tag)
            .count()
    }

    /// Registers a global listener.
    pub fn add_event_listener(&mut self, kind: EventKind, phase: ListenerPhase) -> ListenerId {
        let id = ListenerId(self.next_handle());
        self.listeners.push(ListenerRecord { id, kind, phase });
        id
    }

    /// Unregisters a listener. Returns `false` when it was not registered.
    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|record| record.id != id);
        self.listeners.len() != before
    }

    /// All registered listeners in registration order.
    pub fn listeners(&self) -> &[ListenerRecord] {
        &self.listeners
    }

    /// Listener ids for `kind` in dispatch order: capture phase first, then
    /// bubble, each in registration order.
    pub fn dispatch_order(&self, kind: EventKind) -> Vec<ListenerId> {
        let of_phase = |phase: ListenerPhase| {
            self.listeners
                .iter()
                .filter(move |record| record.kind == kind && record.phase == phase)
                .map(|record| record.id)
        };
        of_phase(ListenerPhase::Capture)
            .chain(of_phase(ListenerPhase::Bubble))
            .collect()
    }

    /// Starts observing child-list mutations in `root`'s subtree.
    pub fn observe_mutations(&mut self, root: ElementId) -> ObserverId {
        let id = ObserverId(self.next_handle());
        self.observers.push(ObserverRecord {
            id,
            root,
            pending: 0,
        });
        id
    }

    /// Stops an observer. Returns `false` when it was not registered.
    pub fn disconnect_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|record| record.id != id);
        self.observers.len() != before
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Returns and resets the number of pending mutation records.
    pub fn take_mutation_records(&mut self, id: ObserverId) -> usize {
        self.observers
            .iter_mut()
            .find(|record| record.id == id)
            .map(|record| std::mem::take(&mut record.pending))
            .unwrap_or(0)
    }

    fn record_mutation(&mut self, target: ElementId) {
        let roots: Vec<(usize, ElementId)> = self
            .observers
            .iter()
            .enumerate()
            .map(|(index, record)| (index, record.root))
            .collect();
        for (index, root) in roots {
            if self.contains(root, target) {
                self.observers[index].pending += 1;
            }
        }
    }

    /// Installs or replaces the page stylesheet with id `id`.
    pub fn inject_style(&mut self, id: &str, css: &str) {
        self.styles.insert(id.to_string(), css.to_string());
    }

    /// Removes a page stylesheet. Returns `false` when it was absent.
    pub fn remove_style(&mut self, id: &str) -> bool {
        self.styles.remove(id).is_some()
    }

    /// Page stylesheet text.
    pub fn style(&self, id: &str) -> Option<&str> {
        self.styles.get(id).map(String::as_str)
    }

    /// Attaches an empty shadow root to `host`.
    ///
    /// # Errors
    /// Returns [`PageError::UnknownElement`] for removed hosts and
    /// [`PageError::ShadowAlreadyAttached`] when called twice.
    pub fn attach_shadow(&mut self, host: ElementId) -> Result<(), PageError> {
        let node = self.node_mut(host).ok_or(PageError::UnknownElement)?;
        if node.shadow.is_some() {
            return Err(PageError::ShadowAlreadyAttached);
        }
        node.shadow = Some(ShadowRoot::default());
        Ok(())
    }

    /// Replaces the content of `host`'s shadow root.
    ///
    /// # Errors
    /// Returns [`PageError::NoShadowRoot`] when no shadow root is attached.
    pub fn set_shadow_content(
        &mut self,
        host: ElementId,
        stylesheet: String,
        markup: String,
    ) -> Result<(), PageError> {
        let shadow = self
            .node_mut(host)
            .and_then(|node| node.shadow.as_mut())
            .ok_or(PageError::NoShadowRoot)?;
        shadow.stylesheet = stylesheet;
        shadow.markup = markup;
        Ok(())
    }

    /// Shadow root attached to `host`.
    pub fn shadow_root(&self, host: ElementId) -> Option<&ShadowRoot> {
        self.node(host).and_then(|node| node.shadow.as_ref())
    }

    /// Registers the teardown hook of the live injection, returning the one it
    /// replaces.
    pub fn install_teardown_hook(&mut self, hook: TeardownHook) -> Option<TeardownHook> {
        self.teardown_hook.replace(hook)
    }

    /// Removes and returns the registered teardown hook.
    pub fn take_teardown_hook(&mut self) -> Option<TeardownHook> {
        self.teardown_hook.take()
    }

    /// Returns `true` when a teardown hook is registered.
    pub fn has_teardown_hook(&self) -> bool {
        self.teardown_hook.is_some()
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn node(&self, element: ElementId) -> Option<&Node> {
        self.nodes.get(element.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, element: ElementId) -> Option<&mut Node> {
        self.nodes.get_mut(element.0).and_then(Option::as_mut)
    }

    fn link(&mut self, parent: ElementId, child: ElementId) {
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
    }

    fn detach(&mut self, child: ElementId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|existing| *existing != child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
    }
}

/// Page model error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    /// Page URL failed to parse.
    #[error("invalid page url: {0}")]
    InvalidUrl(String),
    /// Handle refers to a removed element.
    #[error("element does not exist")]
    UnknownElement,
    /// Insertion would create a cycle.
    #[error("hierarchy request error")]
    HierarchyRequest,
    /// Host already has a shadow root.
    #[error("shadow root already attached")]
    ShadowAlreadyAttached,
    /// Host has no shadow root.
    #[error("element has no shadow root")]
    NoShadowRoot,
}
