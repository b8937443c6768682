//! Widget state transitions.
//!
//! Every widget is a pure transition over the fragment plus the reader's
//! options; preference changes write through the store immediately when
//! `remember` is on. Nothing here owns timers or event loops. Callers
//! pass the click timestamp in.

use once_cell::sync::Lazy;

use crate::config::{ConfigKey, ConfigStore, Options};
use crate::dom::{Fragment, NodeId, Selector};
use crate::enrich::{self, apply_fold_state, collect_fold_groups};

/// A second click on a fold head within this window is the tail of a
/// double click, not a new toggle.
pub const CLICK_DEBOUNCE_MS: u64 = 650;

static FOLDABLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(enrich::FOLDABLE_SELECTOR));
static CN_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(enrich::CN_SELECTOR));

/// Original-language block class paired with its translated-layer class.
pub static EN_CN_PAIRS: &[(&str, &str)] = &[
    ("lexunit", "defcn"),
    ("def", "defcn"),
    ("collo", "collocn"),
    ("gloss", "collocn"),
    ("sign_en", "sign_cn"),
    ("expen", "expcn"),
    ("explen", "explcn"),
];

fn is_sense_number(frag: &Fragment, head: NodeId) -> bool {
    frag.has_class(head, "sensenum")
}

/// Foldable content owned by one fold head: the sense body for a sense
/// number, the box body for a box heading.
fn group_content(frag: &Fragment, head: NodeId) -> Vec<NodeId> {
    if is_sense_number(frag, head) {
        let Some(sense) = frag.parent(head) else {
            return Vec::new();
        };
        frag.select(sense, &FOLDABLE_SEL)
    } else {
        frag.siblings(head)
    }
}

fn group_is_folded(frag: &Fragment, head: NodeId) -> bool {
    if is_sense_number(frag, head) {
        !frag.has_class(head, "opened")
    } else {
        frag.has_class(head, "closed")
    }
}

fn set_group_folded(frag: &mut Fragment, head: NodeId, folded: bool) {
    if is_sense_number(frag, head) {
        if folded {
            frag.remove_class(head, "opened");
        } else {
            frag.add_class(head, "opened");
        }
    } else if folded {
        frag.add_class(head, "closed");
    } else {
        frag.remove_class(head, "closed");
    }
    for id in group_content(frag, head) {
        frag.set_visible(id, !folded);
    }
}

/// Click handling for one fold surface. Timestamps come from the caller
/// so the debounce is testable.
#[derive(Debug, Default)]
pub struct FoldController {
    last_accepted_ms: Option<u64>,
}

impl FoldController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the clicked group. Returns false when the click lands
    /// inside the debounce window of the previous accepted click and the
    /// tree is untouched.
    pub fn click(&mut self, frag: &mut Fragment, head: NodeId, now_ms: u64) -> bool {
        if let Some(last) = self.last_accepted_ms {
            if now_ms.saturating_sub(last) < CLICK_DEBOUNCE_MS {
                return false;
            }
        }
        self.last_accepted_ms = Some(now_ms);
        let folded = group_is_folded(frag, head);
        set_group_folded(frag, head, !folded);
        true
    }

    /// A double click flips the fragment-wide fold default, persists it,
    /// and re-applies it to every group.
    pub fn double_click(
        &mut self,
        frag: &mut Fragment,
        root: NodeId,
        options: &mut Options,
        store: &dyn ConfigStore,
    ) {
        self.last_accepted_ms = None;
        toggle_fold_default(frag, root, options, store);
    }
}

/// The fold-all button: flip the default, persist, re-apply everywhere.
pub fn toggle_fold_default(
    frag: &mut Fragment,
    root: NodeId,
    options: &mut Options,
    store: &dyn ConfigStore,
) {
    options.default_fold = !options.default_fold;
    options.persist(store, ConfigKey::DefaultFold);
    let groups = collect_fold_groups(frag, root);
    apply_fold_state(frag, &groups, options.default_fold);
}

/// The bilingual button: flip the default, persist, re-apply to every
/// translated-layer node.
pub fn toggle_cn_default(
    frag: &mut Fragment,
    root: NodeId,
    options: &mut Options,
    store: &dyn ConfigStore,
) {
    options.default_show_cn = !options.default_show_cn;
    options.persist(store, ConfigKey::DefaultShowCn);
    for cn in frag.select(root, &CN_SEL) {
        frag.set_visible(cn, options.default_show_cn);
    }
    for button in frag.select(root, &Selector::parse(".kbtn.cn")) {
        if options.default_show_cn {
            frag.remove_class(button, "clicked");
        } else {
            frag.add_class(button, "clicked");
        }
    }
}

// ---- level slider -----------------------------------------------------------

/// Maps a pointer x-position across the slider track to a tier 0..=3.
pub fn level_from_position(x: f64, track_left: f64, track_width: f64) -> u8 {
    if track_width <= 0.0 {
        return 0;
    }
    let ratio = ((x - track_left) / track_width).clamp(0.0, 1.0);
    (ratio * 3.0).round() as u8
}

/// Shows tiers up to `level` and hides the ones above it.
pub fn apply_topic_level(frag: &mut Fragment, root: NodeId, level: u8) {
    for tier in 0u8..=3 {
        let selector = Selector::parse(&format!(".level{tier}"));
        for id in frag.select(root, &selector) {
            frag.set_visible(id, tier <= level);
        }
    }
    for thumb in frag.select(root, &Selector::parse(".slider-thumb")) {
        frag.set_attr(thumb, "data-level", &level.to_string());
    }
}

/// Slider release: clamp, persist, re-filter the tiers.
pub fn set_topic_level(
    frag: &mut Fragment,
    root: NodeId,
    level: u8,
    options: &mut Options,
    store: &dyn ConfigStore,
) {
    options.default_topic_level = level.min(3);
    options.persist(store, ConfigKey::DefaultTopicLevel);
    apply_topic_level(frag, root, options.default_topic_level);
}

// ---- tabs -------------------------------------------------------------------

fn tab_container(frag: &Fragment, bar: NodeId) -> Option<NodeId> {
    frag.siblings(bar)
        .into_iter()
        .find(|&s| frag.has_class(s, "tab-content"))
}

fn pane_for(frag: &Fragment, container: NodeId, index: &str) -> Option<NodeId> {
    frag.child_elements(container)
        .into_iter()
        .find(|&p| frag.attr(p, "data-tab") == Some(index))
}

/// Popup-button click: exclusive toggle of the indexed pane. A second
/// click on the active button closes its pane.
pub fn toggle_tab(frag: &mut Fragment, button: NodeId) {
    let Some(bar) = frag.parent(button) else {
        return;
    };
    let Some(container) = tab_container(frag, bar) else {
        return;
    };
    let Some(index) = frag.attr(button, "data-tab").map(str::to_string) else {
        return;
    };
    if frag.has_class(button, "clicked") {
        frag.remove_class(button, "clicked");
        if let Some(pane) = pane_for(frag, container, &index) {
            frag.hide(pane);
        }
        return;
    }
    for sibling in frag.child_elements(bar) {
        if sibling != button && frag.has_class(sibling, "clicked") {
            frag.remove_class(sibling, "clicked");
            if let Some(other) = frag.attr(sibling, "data-tab").map(str::to_string) {
                if let Some(pane) = pane_for(frag, container, &other) {
                    frag.hide(pane);
                }
            }
        }
    }
    frag.add_class(button, "clicked");
    if let Some(pane) = pane_for(frag, container, &index) {
        frag.show(pane);
    }
}

/// A pane header click triggers the pane's own button in reverse.
pub fn toggle_pane(frag: &mut Fragment, pane: NodeId) {
    let Some(container) = frag.closest(pane, |f, a| f.has_class(a, "tab-content")) else {
        return;
    };
    let Some(index) = frag
        .closest(pane, |f, a| f.attr(a, "data-tab").is_some())
        .and_then(|p| frag.attr(p, "data-tab").map(str::to_string))
    else {
        return;
    };
    let bar = frag
        .siblings(container)
        .into_iter()
        .find(|&s| frag.has_class(s, "buttons"));
    let Some(bar) = bar else {
        return;
    };
    let button = frag
        .child_elements(bar)
        .into_iter()
        .find(|&b| frag.attr(b, "data-tab") == Some(index.as_str()));
    if let Some(button) = button {
        toggle_tab(frag, button);
    }
}

// ---- pronunciation ----------------------------------------------------------

/// Clicking the pronunciation codes exchanges the headword and the
/// hyphenated form when both are present.
pub fn swap_proncodes(frag: &mut Fragment, proncodes: NodeId) -> bool {
    let siblings = frag.siblings(proncodes);
    let hwd = siblings.iter().copied().find(|&s| frag.has_class(s, "hwd"));
    let hyph = siblings
        .iter()
        .copied()
        .find(|&s| frag.has_class(s, "hyphenation"));
    let (Some(hwd), Some(hyph)) = (hwd, hyph) else {
        return false;
    };
    if frag.text(hwd).trim().is_empty() || frag.text(hyph).trim().is_empty() {
        return false;
    }
    let hwd_children = frag.children(hwd);
    let hyph_children = frag.children(hyph);
    for child in hwd_children {
        frag.append_child(hyph, child);
    }
    for child in hyph_children {
        frag.append_child(hwd, child);
    }
    true
}

// ---- bilingual block toggle -------------------------------------------------

/// Per-block language switch. An original-language block flips the
/// visibility of its paired translated sibling. A translated block hides
/// itself, except in only-Chinese mode where it toggles the original
/// sibling and its own `only` styling instead. Disabled unless the
/// `en_cn_switch` option is on.
pub fn toggle_block_language(frag: &mut Fragment, block: NodeId, options: &Options) -> bool {
    if !options.en_cn_switch {
        return false;
    }
    let Some(class) = frag.first_class(block) else {
        return false;
    };
    if EN_CN_PAIRS.iter().any(|&(_, cn)| cn == class) {
        if options.only_cn {
            let en = frag.siblings(block).into_iter().find(|&s| {
                EN_CN_PAIRS
                    .iter()
                    .any(|&(en, cn)| cn == class && frag.has_class(s, en))
            });
            if let Some(en) = en {
                frag.set_visible(en, frag.is_hidden(en));
            }
            if frag.has_class(block, "only") {
                frag.remove_class(block, "only");
            } else {
                frag.add_class(block, "only");
            }
        } else {
            frag.hide(block);
        }
        return true;
    }
    let Some(&(_, cn_class)) = EN_CN_PAIRS.iter().find(|(en, _)| *en == class) else {
        return false;
    };
    let cn = frag
        .siblings(block)
        .into_iter()
        .find(|&s| frag.has_class(s, cn_class));
    let Some(cn) = cn else {
        return false;
    };
    let cn_hidden = frag.is_hidden(cn);
    frag.set_visible(cn, cn_hidden);
    frag.set_visible(block, !cn_hidden);
    true
}
