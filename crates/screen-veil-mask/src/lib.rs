#![warn(missing_docs)]
//! # screen-veil-mask
//!
//! ## Purpose
//! Obscures sensitive page elements during capture and owns the
//! click-to-mask editing interaction.
//!
//! ## Responsibilities
//! - Generate stable selectors for clicked elements ([`generate_selector`]).
//! - Toggle mask rules, persist them per origin, and apply the visual effect.
//! - Re-apply every rule idempotently after DOM mutations.
//! - Lift and restore masks for the smart-pause peek.
//!
//! ## Data flow
//! Stored selectors -> [`MaskingEngine::load`] -> [`MaskingEngine::apply_all`];
//! editing click -> [`MaskingEngine::handle_click`] -> rule toggle -> persist
//! -> `apply_all`.
//!
//! ## Ownership and lifetimes
//! The engine owns the rule set; the page is borrowed per call so one page
//! can be shared by successive injections.
//!
//! ## Error model
//! Invalid selectors are skipped one by one and reported in
//! [`ApplyReport`]. Storage failures are logged and never undo the
//! in-memory toggle. Clicks on protected elements return
//! [`MaskError::Protected`].
//!
//! ## Security and privacy notes
//! Masking changes only classes and the `type` attribute of inputs; page
//! semantics outside the masked element are left alone.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use screen_veil_core::{MaskAppearance, MaskKind, MaskStyle, MaskTool, PrivacyConfig};
use screen_veil_page::{ElementId, EventKind, ListenerId, ListenerPhase, Page, PointerEvent};
use screen_veil_storage::{OriginKey, SelectorPersistence};
use thiserror::Error;

/// Prefix shared by every class and id the tool adds to the page.
pub const TOOL_PREFIX: &str = "screen-veil";
/// Id of the widget host element.
pub const WIDGET_ROOT_ID: &str = "screen-veil-root";
/// Class applied by the blur tool.
pub const BLUR_CLASS: &str = "screen-veil-blur";
/// Class applied by the mask tool.
pub const MASK_CLASS: &str = "screen-veil-mask";
/// Hover highlight class in editing mode.
pub const HOVER_CLASS: &str = "screen-veil-hover-target";
/// Body class while editing is enabled.
pub const EDITING_CLASS: &str = "screen-veil-privacy-editing";
/// Body class while smart pause peeks behind masks.
pub const PEEKING_CLASS: &str = "screen-veil-peeking";
/// Body class while the capture is paused.
pub const PAUSED_CLASS: &str = "screen-veil-recording-paused";
/// Attribute remembering an input's type before it was secretized.
pub const ORIGINAL_TYPE_ATTR: &str = "data-screen-veil-original-type";
/// Id of the injected mask stylesheet.
pub const STYLE_ID: &str = "screen-veil-mask-styles";

const BASE_STYLESHEET: &str = "\
.screen-veil-blur { filter: blur(var(--screen-veil-blur-intensity)) !important; user-select: none !important; pointer-events: none !important; }
.screen-veil-mask { background-color: var(--screen-veil-mask-bg-color) !important; background-image: var(--screen-veil-mask-image) !important; color: transparent !important; user-select: none !important; pointer-events: none !important; }
.screen-veil-mask * { visibility: hidden !important; }
body.screen-veil-privacy-editing .screen-veil-blur,
body.screen-veil-privacy-editing .screen-veil-mask { pointer-events: auto !important; cursor: pointer !important; outline: 2px dashed #ff4444; }
body.screen-veil-privacy-editing { border: 4px solid #ff4444 !important; box-sizing: border-box !important; cursor: crosshair !important; }
body.screen-veil-privacy-editing * { cursor: crosshair !important; }
.screen-veil-hover-target { outline: 2px dashed #ff4444 !important; background: rgba(255, 68, 68, 0.1) !important; }
body.screen-veil-recording-paused { border: 5px solid #ffca28 !important; }
body.screen-veil-peeking .screen-veil-blur { filter: none !important; }
body.screen-veil-peeking .screen-veil-mask { background: none !important; color: inherit !important; }
";

const DOTS_IMAGE: &str = "radial-gradient(#94a3b8 1px, transparent 1px) 0 0 / 8px 8px";

/// Input types that are never switched to password rendering.
const NON_SECRET_INPUT_TYPES: [&str; 5] = ["password", "submit", "button", "checkbox", "radio"];

/// Page stylesheet backing every mask class, with `appearance` bound to the
/// custom properties the rules read.
pub fn mask_stylesheet(appearance: MaskAppearance) -> String {
    let (background, image) = match appearance.mask_style {
        MaskStyle::Solid => ("#000", "none"),
        MaskStyle::Dots => ("#f1f5f9", DOTS_IMAGE),
    };
    format!(
        ":root {{ --screen-veil-blur-intensity: {}px; --screen-veil-mask-bg-color: {background}; --screen-veil-mask-image: {image}; }}\n{BASE_STYLESHEET}",
        appearance.blur_intensity_px
    )
}

/// Class applied by `tool` for [`MaskKind::Obscure`].
pub fn tool_class(tool: MaskTool) -> &'static str {
    match tool {
        MaskTool::Mask => MASK_CLASS,
        MaskTool::Blur => BLUR_CLASS,
    }
}

/// Returns `true` when `element` is the widget host or inside it.
pub fn is_inside_widget(page: &Page, element: ElementId) -> bool {
    let mut current = Some(element);
    while let Some(candidate) = current {
        if page.element_id(candidate) == Some(WIDGET_ROOT_ID) {
            return true;
        }
        current = page.parent(candidate);
    }
    false
}

/// Builds the selector a click on `element` persists.
///
/// Policy, in order:
/// 1. `#id` when the element has an id.
/// 2. `tag.class1.class2` from classes longer than two characters that do
///    not carry the tool prefix.
/// 3. A positional path up to, excluding, `<html>`: `tag` segments with
///    `:nth-of-type(n)` when same-tag siblings precede the element, joined by
///    `" > "`. An ancestor id ends the walk with a `tag#id` segment.
///
/// Identifiers are not escaped; a selector that cannot parse is skipped on
/// re-application like any other invalid rule.
pub fn generate_selector(page: &Page, element: ElementId) -> Option<String> {
    let tag = page.tag(element)?;

    if let Some(id) = page.element_id(element) {
        return Some(format!("#{id}"));
    }

    let classes: Vec<&str> = page
        .classes(element)
        .iter()
        .map(String::as_str)
        .filter(|class| !class.starts_with(TOOL_PREFIX) && class.chars().count() > 2)
        .collect();
    if !classes.is_empty() {
        return Some(format!("{tag}.{}", classes.join(".")));
    }

    let mut segments = Vec::new();
    let mut current = Some(element);
    while let Some(node) = current {
        let Some(tag) = page.tag(node) else {
            break;
        };
        if tag == "html" {
            break;
        }
        if let Some(id) = page.element_id(node) {
            segments.push(format!("{tag}#{id}"));
            break;
        }

        let nth = page.nth_of_type(node);
        if nth > 1 {
            segments.push(format!("{tag}:nth-of-type({nth})"));
        } else {
            segments.push(tag.to_string());
        }
        current = page.parent(node);
    }

    segments.reverse();
    Some(segments.join(" > "))
}

/// Decides which visual operation `tool` performs on `element`.
///
/// Returns `None` for elements that are never masked: `<html>`, `<body>`,
/// and the widget.
pub fn mask_kind_for(page: &Page, element: ElementId, tool: MaskTool) -> Option<MaskKind> {
    let tag = page.tag(element)?;
    if tag == "html" || tag == "body" || is_inside_widget(page, element) {
        return None;
    }

    if page.attribute(element, ORIGINAL_TYPE_ATTR).is_some() {
        return Some(MaskKind::Secretize);
    }
    match page.input_type(element) {
        Some(input_type) if !NON_SECRET_INPUT_TYPES.contains(&input_type) => {
            Some(MaskKind::Secretize)
        }
        _ => Some(MaskKind::Obscure(tool)),
    }
}

/// Applies the mask `tool` implies for `element`. Idempotent.
pub fn apply_mask(page: &mut Page, element: ElementId, tool: MaskTool) -> Option<MaskKind> {
    let kind = mask_kind_for(page, element, tool)?;
    match kind {
        MaskKind::Secretize => {
            if page.attribute(element, ORIGINAL_TYPE_ATTR).is_none() {
                let original = page.input_type(element).unwrap_or("text").to_string();
                page.set_attribute(element, ORIGINAL_TYPE_ATTR, &original);
            }
            page.set_attribute(element, "type", "password");
        }
        MaskKind::Obscure(tool) => {
            page.add_class(element, tool_class(tool));
        }
    }
    Some(kind)
}

/// Removes every mask effect from `element`, restoring a secretized input's
/// original type.
pub fn remove_mask(page: &mut Page, element: ElementId) {
    page.remove_class(element, BLUR_CLASS);
    page.remove_class(element, MASK_CLASS);
    if let Some(original) = page.attribute(element, ORIGINAL_TYPE_ATTR).map(str::to_string) {
        page.set_attribute(element, "type", &original);
        page.remove_attribute(element, ORIGINAL_TYPE_ATTR);
    }
}

/// Returns `true` when `element` currently carries a mask effect.
pub fn is_masked(page: &Page, element: ElementId) -> bool {
    page.has_class(element, BLUR_CLASS)
        || page.has_class(element, MASK_CLASS)
        || page.attribute(element, ORIGINAL_TYPE_ATTR).is_some()
}

fn masked_elements(page: &Page) -> Vec<ElementId> {
    page.document_order()
        .into_iter()
        .filter(|element| is_masked(page, *element))
        .collect()
}

/// Effect currently on a masked element, read back from the page.
fn current_kind(page: &Page, element: ElementId) -> MaskKind {
    if page.attribute(element, ORIGINAL_TYPE_ATTR).is_some() {
        MaskKind::Secretize
    } else if page.has_class(element, BLUR_CLASS) {
        MaskKind::Obscure(MaskTool::Blur)
    } else {
        MaskKind::Obscure(MaskTool::Mask)
    }
}

/// Listener handles installed while editing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditingListeners {
    /// Capturing `mouseover` for hover highlight.
    pub mouse_over: ListenerId,
    /// Capturing `mouseout` for hover highlight.
    pub mouse_out: ListenerId,
    /// Capturing `click` for toggling.
    pub click: ListenerId,
}

impl EditingListeners {
    /// Returns `true` when `id` belongs to this set.
    pub fn contains(&self, id: ListenerId) -> bool {
        id == self.mouse_over || id == self.mouse_out || id == self.click
    }
}

/// Result of a rule toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Rule added and applied.
    Masked {
        /// Rule selector.
        selector: String,
    },
    /// Rule removed and effect lifted.
    Unmasked {
        /// Rule selector.
        selector: String,
    },
}

/// Summary of one [`MaskingEngine::apply_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Elements matched across all valid rules.
    pub matched: usize,
    /// Rules whose selector failed to parse.
    pub invalid: Vec<String>,
}

/// Rule set plus editing state for one origin.
pub struct MaskingEngine {
    origin: OriginKey,
    persistence: SelectorPersistence,
    rules: BTreeMap<String, MaskTool>,
    config: PrivacyConfig,
    editing: Option<EditingListeners>,
    hovered: Option<ElementId>,
    peeking: bool,
    lifted: Vec<(ElementId, MaskKind)>,
    reported_invalid: BTreeSet<String>,
}

impl MaskingEngine {
    /// Creates an engine with the origin's stored rules.
    ///
    /// Stored rules carry no tool, so they are restored with the default
    /// tool.
    pub fn load(origin: OriginKey, persistence: SelectorPersistence) -> Self {
        let rules = persistence
            .load(&origin)
            .into_iter()
            .map(|selector| (selector, MaskTool::default()))
            .collect::<BTreeMap<_, _>>();
        info!("mask engine loaded {} rules for {}", rules.len(), origin.as_str());

        Self {
            origin,
            persistence,
            rules,
            config: PrivacyConfig::default(),
            editing: None,
            hovered: None,
            peeking: false,
            lifted: Vec::new(),
            reported_invalid: BTreeSet::new(),
        }
    }

    /// Storage key of the engine's origin.
    pub fn origin(&self) -> &OriginKey {
        &self.origin
    }

    /// Current privacy settings.
    pub fn config(&self) -> PrivacyConfig {
        self.config
    }

    /// Selects the tool used for new rules.
    pub fn set_tool(&mut self, tool: MaskTool) {
        self.config.active_tool = tool;
    }

    /// Active rule selectors in sorted order.
    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Returns `true` when `selector` is an active rule.
    pub fn has_rule(&self, selector: &str) -> bool {
        self.rules.contains_key(selector)
    }

    /// Returns `true` while editing listeners are installed.
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// Returns `true` while masks are lifted for peek.
    pub fn is_peeking(&self) -> bool {
        self.peeking
    }

    /// Listener handles while editing.
    pub fn editing_listeners(&self) -> Option<EditingListeners> {
        self.editing
    }

    /// Installs the mask stylesheet. Safe to call repeatedly; the latest
    /// appearance wins.
    pub fn install_styles(&self, page: &mut Page, appearance: MaskAppearance) {
        page.inject_style(STYLE_ID, &mask_stylesheet(appearance));
    }

    /// Turns on click-to-mask editing.
    pub fn enable_editing(&mut self, page: &mut Page) {
        self.config.enabled = true;
        if self.editing.is_some() {
            return;
        }

        let body = page.body();
        page.add_class(body, EDITING_CLASS);
        self.editing = Some(EditingListeners {
            mouse_over: page.add_event_listener(EventKind::MouseOver, ListenerPhase::Capture),
            mouse_out: page.add_event_listener(EventKind::MouseOut, ListenerPhase::Capture),
            click: page.add_event_listener(EventKind::Click, ListenerPhase::Capture),
        });
        info!("privacy editing enabled");
    }

    /// Turns off editing, keeping every existing mask.
    pub fn disable_editing(&mut self, page: &mut Page) {
        self.config.enabled = false;

        let body = page.body();
        page.remove_class(body, EDITING_CLASS);
        if let Some(listeners) = self.editing.take() {
            page.remove_event_listener(listeners.mouse_over);
            page.remove_event_listener(listeners.mouse_out);
            page.remove_event_listener(listeners.click);
            info!("privacy editing disabled");
        }
        self.clear_hover(page);
    }

    /// Hover highlight for the element under the pointer.
    pub fn handle_mouse_over(&mut self, page: &mut Page, target: ElementId) {
        if self.editing.is_none() || is_inside_widget(page, target) {
            return;
        }
        if let Some(previous) = self.hovered.take() {
            page.remove_class(previous, HOVER_CLASS);
        }
        page.add_class(target, HOVER_CLASS);
        self.hovered = Some(target);
    }

    /// Drops the hover highlight from the element the pointer left.
    pub fn handle_mouse_out(&mut self, page: &mut Page, target: ElementId) {
        page.remove_class(target, HOVER_CLASS);
        if self.hovered == Some(target) {
            self.hovered = None;
        }
    }

    /// Intercepts an editing click and toggles the target.
    ///
    /// Returns the toggle outcome when the click was consumed. Clicks are
    /// ignored outside editing, during peek, and inside the widget.
    pub fn handle_click(&mut self, page: &mut Page, event: &mut PointerEvent) -> Option<ToggleOutcome> {
        if self.editing.is_none() || self.peeking || is_inside_widget(page, event.target) {
            return None;
        }

        event.prevent_default();
        event.stop_propagation();

        match self.toggle_element(page, event.target) {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                debug!("click not toggled: {error}");
                None
            }
        }
    }

    /// Adds or removes the rule for `element` and updates every match.
    ///
    /// # Errors
    /// Returns [`MaskError::Protected`] for `<html>`, `<body>`, and widget
    /// elements, and [`MaskError::UnknownElement`] for removed elements.
    pub fn toggle_element(&mut self, page: &mut Page, element: ElementId) -> Result<ToggleOutcome, MaskError> {
        let tool = self.config.active_tool;
        if !page.exists(element) {
            return Err(MaskError::UnknownElement);
        }
        if mask_kind_for(page, element, tool).is_none() {
            return Err(MaskError::Protected);
        }
        let selector = generate_selector(page, element).ok_or(MaskError::UnknownElement)?;

        let targets = match page.query_selector_all(&selector) {
            Ok(mut matched) => {
                if !matched.contains(&element) {
                    matched.push(element);
                }
                matched
            }
            Err(error) => {
                warn!("generated selector does not parse, masking the clicked element only: {error}");
                vec![element]
            }
        };

        let outcome = if self.rules.remove(&selector).is_some() {
            self.lifted.retain(|(lifted, _)| !targets.contains(lifted));
            for target in targets {
                remove_mask(page, target);
            }
            ToggleOutcome::Unmasked { selector }
        } else {
            self.rules.insert(selector.clone(), tool);
            for target in targets {
                apply_mask(page, target, tool);
            }
            ToggleOutcome::Masked { selector }
        };
        debug!("mask toggle: {outcome:?}");

        self.persist();
        self.apply_all(page);
        Ok(outcome)
    }

    /// Applies every rule to the current DOM. Idempotent; a no-op while
    /// peeking.
    pub fn apply_all(&mut self, page: &mut Page) -> ApplyReport {
        let mut report = ApplyReport::default();
        if self.peeking {
            return report;
        }

        for (selector, tool) in &self.rules {
            match page.query_selector_all(selector) {
                Ok(matched) => {
                    for element in matched {
                        if apply_mask(page, element, *tool).is_some() {
                            report.matched += 1;
                        }
                    }
                }
                Err(error) => {
                    if self.reported_invalid.insert(selector.clone()) {
                        warn!("skipping invalid mask selector: {error}");
                    }
                    report.invalid.push(selector.clone());
                }
            }
        }
        report
    }

    /// Removes every effect, forgets every rule, and deletes the durable
    /// record for the origin.
    ///
    /// # Errors
    /// Returns [`MaskError::Storage`] when the record cannot be deleted; the
    /// page and the in-memory rules are already cleared at that point.
    pub fn clear_all(&mut self, page: &mut Page) -> Result<(), MaskError> {
        for element in masked_elements(page) {
            remove_mask(page, element);
        }
        self.rules.clear();
        self.lifted.clear();
        self.reported_invalid.clear();
        info!("cleared all mask rules for {}", self.origin.as_str());
        self.persistence.clear(&self.origin).map_err(MaskError::Storage)
    }

    /// Lifts (`true`) or restores (`false`) every mask without touching rules.
    ///
    /// Release puts back exactly the effects that were lifted, including
    /// masks on elements no stored selector reaches, then re-applies the
    /// rules for elements added meanwhile.
    pub fn set_peek(&mut self, page: &mut Page, peeking: bool) {
        if self.peeking == peeking {
            return;
        }

        let body = page.body();
        if peeking {
            for element in masked_elements(page) {
                self.lifted.push((element, current_kind(page, element)));
                remove_mask(page, element);
            }
            page.add_class(body, PEEKING_CLASS);
            self.peeking = true;
        } else {
            page.remove_class(body, PEEKING_CLASS);
            self.peeking = false;
            for (element, kind) in std::mem::take(&mut self.lifted) {
                if !page.exists(element) {
                    continue;
                }
                let tool = match kind {
                    MaskKind::Obscure(tool) => tool,
                    MaskKind::Secretize => MaskTool::default(),
                };
                apply_mask(page, element, tool);
            }
            self.apply_all(page);
        }
    }

    /// Removes hover highlights left on the page.
    pub fn clear_hover(&mut self, page: &mut Page) {
        self.hovered = None;
        for element in page.elements_with_class(HOVER_CLASS) {
            page.remove_class(element, HOVER_CLASS);
        }
    }

    fn persist(&self) {
        let selectors: BTreeSet<String> = self.rules.keys().cloned().collect();
        if let Err(error) = self.persistence.save(&self.origin, &selectors) {
            warn!("mask rules not persisted for {}: {error}", self.origin.as_str());
        }
    }
}

/// Error type for mask operations.
#[derive(Debug, Error)]
pub enum MaskError {
    /// Element is never masked.
    #[error("element cannot be masked")]
    Protected,
    /// Element was removed from the page.
    #[error("element does not exist")]
    UnknownElement,
    /// Durable record could not be written.
    #[error("mask storage failure: {0}")]
    Storage(#[from] screen_veil_storage::StorageError),
}
