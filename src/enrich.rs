//! The enrichment pass.
//!
//! A freshly parsed definition fragment goes through a fixed sequence of
//! rewrites: decorative cleanup, abbreviation substitution, tab and jump
//! wiring, bilingual visibility, the cross-reference merge, fold-state
//! computation, and widget scaffolding. The pass runs at most once per
//! fragment; a marker attribute on the root guards re-entry. Every step
//! is selector-driven and skips silently when the fragment has no
//! matching elements.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rand::distributions::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::abbrev;
use crate::config::Options;
use crate::dom::{Fragment, NodeId, Selector};
use crate::theme::{self, Theme};
use crate::widgets;

/// Root attribute marking an already-enriched fragment.
pub const MARKER_ATTR: &str = "data-enriched";

/// Translated-layer nodes, paired one-to-one with original-language nodes.
pub const CN_SELECTOR: &str = ".defcn, .collocn, .expcn, .explcn, .sign_cn";

/// Content hidden and shown by the fold widgets.
pub const FOLDABLE_SELECTOR: &str = ".example, .gramexa, .colloexa";

static ROOT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(".lexfold"));
static CN_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(CN_SELECTOR));
static FOLDABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(FOLDABLE_SELECTOR));
static BOX_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(".usagebox, .grambox, .f2nbox"));
static GRAMMAR_TEXT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(".gram, .geo"));
static SHORTHAND_TEXT_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".sign_en, .lexunit, .propform, .phrv, .collo, .object, .exp, .phrasetext")
});
static JUMP_SOURCE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".signpost, .phrv, .phrvbhwd, .lexunit"));
static SECTION_ENTRY_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(".exponent, .collocate"));
static TRANSLATABLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".example, .def, .etymsense"));

/// Strips the bidirectional-arrow glyph, collapses doubled spaces, trims.
/// Jump wiring and the cross-reference merge compare text in this form.
pub(crate) fn normalize_text(input: &str) -> String {
    let mut out = input.replace('\u{2194}', "");
    while out.contains("  ") {
        out = out.replace("  ", " ");
    }
    out.trim().to_string()
}

fn random_id(rng: &mut SmallRng) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

/// State shared between the enrichment pass and the fold widgets: the
/// foldable content plus the affordances that reflect its visibility.
#[derive(Debug, Default)]
pub struct FoldGroups {
    pub fold_set: Vec<NodeId>,
    pub sense_numbers: Vec<NodeId>,
    pub box_heads: Vec<NodeId>,
    pub fold_buttons: Vec<NodeId>,
}

fn outside_boxes(frag: &Fragment, id: NodeId) -> bool {
    frag.closest(id, |f, a| {
        f.has_class(a, "at-link")
            || f.has_class(a, "usagebox")
            || f.has_class(a, "grambox")
            || f.has_class(a, "f2nbox")
    })
    .is_none()
}

/// Recomputes the fold groups of an enriched fragment.
pub fn collect_fold_groups(frag: &Fragment, root: NodeId) -> FoldGroups {
    let mut groups = FoldGroups::default();
    groups.fold_set = frag
        .select(root, &FOLDABLE_SEL)
        .into_iter()
        .filter(|&id| outside_boxes(frag, id))
        .collect();
    for boxed in frag.select(root, &BOX_SEL) {
        for head in frag.child_elements(boxed) {
            if frag.has_class(head, "heading") && !frag.has_class(head, "newline") {
                groups.box_heads.push(head);
                groups.fold_set.extend(frag.siblings(head));
            }
        }
    }
    for sensenum in frag.select(root, &Selector::parse(".sensenum")) {
        let in_sense = frag
            .parent(sensenum)
            .map(|p| frag.has_class(p, "sense"))
            .unwrap_or(false);
        if in_sense && frag.has_class(sensenum, "treated") {
            groups.sense_numbers.push(sensenum);
        }
    }
    for button in frag.select(root, &Selector::parse(".kbtn.fold")) {
        groups.fold_buttons.push(button);
    }
    groups
}

/// Applies one fold state to every group at once. Folded means sense
/// numbers lose `opened`, box heads gain `closed`, fold buttons gain
/// `clicked`, and the fold set is hidden; expanded is the exact inverse.
pub fn apply_fold_state(frag: &mut Fragment, groups: &FoldGroups, folded: bool) {
    for &sensenum in &groups.sense_numbers {
        if folded {
            frag.remove_class(sensenum, "opened");
        } else {
            frag.add_class(sensenum, "opened");
        }
    }
    for &head in &groups.box_heads {
        if folded {
            frag.add_class(head, "closed");
        } else {
            frag.remove_class(head, "closed");
        }
    }
    for &button in &groups.fold_buttons {
        if folded {
            frag.add_class(button, "clicked");
        } else {
            frag.remove_class(button, "clicked");
        }
    }
    for &id in &groups.fold_set {
        frag.set_visible(id, !folded);
    }
}

/// Runs the full pass over one fragment.
pub struct Enricher {
    options: Options,
    theme: Theme,
}

impl Enricher {
    pub fn new(options: Options, theme: Theme) -> Self {
        Self { options, theme }
    }

    /// Enriches the fragment in place. Returns false when the fragment has
    /// no `.lexfold` root or was already enriched; the tree is untouched
    /// in either case.
    pub fn enrich(&self, frag: &mut Fragment) -> bool {
        let Some(root) = frag.select_first(frag.root(), &ROOT_SEL) else {
            return false;
        };
        if frag.attr(root, MARKER_ATTR) == Some("true") {
            return false;
        }
        frag.set_attr(root, MARKER_ATTR, "true");

        self.strip_phrase_arrows(frag, root);
        self.widen_header_cells(frag, root);
        self.abbreviate_grammar_labels(frag, root);
        self.abbreviate_pattern_shorthand(frag, root);
        self.restyle_arrows(frag, root);
        self.apply_only_cn(frag, root);
        self.rebuild_tabs(frag, root);
        self.number_homographs(frag, root);
        self.wire_jumps(frag, root);
        self.prune_and_toggle_cn(frag, root);
        self.merge_cross_references(frag, root);
        self.cleanup_after_merge(frag, root);
        let groups = self.prepare_fold_groups(frag, root);
        apply_fold_state(frag, &groups, self.options.default_fold);
        self.scaffold_buttons(frag, root, &groups);
        self.mark_thesaurus_pointers(frag, root);
        self.link_word_family(frag, root);
        self.tier_word_sets(frag, root);
        self.collapse_spoken_sections(frag, root);
        self.insert_level_slider(frag, root);
        self.mark_translatable(frag, root);
        theme::apply_theme(frag, root, self.theme);
        true
    }

    /// Decorative "► " spans under phrase headers carry no content.
    fn strip_phrase_arrows(&self, frag: &mut Fragment, root: NodeId) {
        for phrase in frag.select(root, &Selector::parse(".phrase")) {
            for span in frag.find(phrase, |f, id| {
                f.tag(id) == Some("span") && f.text(id).trim() == "\u{25ba}"
            }) {
                frag.remove(span);
            }
        }
    }

    fn widen_header_cells(&self, frag: &mut Fragment, root: NodeId) {
        for td in frag.select(root, &Selector::parse("td.header")) {
            frag.set_attr(td, "colspan", "100");
        }
    }

    fn rewrite_text(&self, frag: &mut Fragment, targets: &[NodeId], rewrite: fn(&str) -> String) {
        for &target in targets {
            for text_node in frag.text_nodes(target) {
                if let Some(text) = frag.text_value(text_node) {
                    let replaced = rewrite(text);
                    if replaced != text {
                        frag.set_text_value(text_node, &replaced);
                    }
                }
            }
        }
    }

    fn abbreviate_grammar_labels(&self, frag: &mut Fragment, root: NodeId) {
        let targets = frag.select(root, &GRAMMAR_TEXT_SEL);
        self.rewrite_text(frag, &targets, abbrev::abbreviate_grammar);
    }

    fn abbreviate_pattern_shorthand(&self, frag: &mut Fragment, root: NodeId) {
        let targets = frag.select(root, &SHORTHAND_TEXT_SEL);
        self.rewrite_text(frag, &targets, abbrev::abbreviate_shorthand);
    }

    /// Replaces each arrow glyph with the two-part styled form.
    fn restyle_arrows(&self, frag: &mut Fragment, root: NodeId) {
        for arrow in frag.select(root, &Selector::parse(".arrow")) {
            frag.set_text(arrow, "");
            for part in ["arrow1", "arrow2"] {
                let span = frag.create_element("span");
                frag.set_class(span, part);
                frag.append_child(arrow, span);
            }
        }
    }

    fn apply_only_cn(&self, frag: &mut Fragment, root: NodeId) {
        if !self.options.only_cn {
            return;
        }
        for hidden in frag.select(root, &Selector::parse(".def, .sign_en")) {
            frag.hide(hidden);
        }
        for shown in frag.select(root, &Selector::parse(".sign_cn, .defcn")) {
            frag.add_class(shown, "only");
        }
    }

    /// Moves each button bar's quick-reference panes into a tab container
    /// directly after the bar, indexing buttons onto panes. The obsolete
    /// "word sets" button goes away; its entries render through the
    /// category path.
    fn rebuild_tabs(&self, frag: &mut Fragment, root: NodeId) {
        for bar in frag.select(root, &Selector::parse(".buttons")) {
            for button in frag.child_elements(bar) {
                if frag.text(button).trim().eq_ignore_ascii_case("word sets") {
                    frag.remove(button);
                }
            }
            let panes: Vec<NodeId> = frag
                .siblings(bar)
                .into_iter()
                .filter(|&s| frag.has_class(s, "at-link"))
                .collect();
            if panes.is_empty() {
                continue;
            }
            let container = frag.create_element("div");
            frag.set_class(container, "tab-content");
            frag.insert_after(bar, container);
            for (index, &pane) in panes.iter().enumerate() {
                frag.append_child(container, pane);
                frag.set_attr(pane, "data-tab", &index.to_string());
            }
            for (index, button) in frag.child_elements(bar).into_iter().enumerate() {
                frag.set_attr(button, "data-tab", &index.to_string());
            }
            if self.options.auto_show_origin {
                self.open_origin_tab(frag, bar, container);
            }
        }
    }

    /// With the auto-show-origin option on, the "Word Origin" pane starts
    /// open as if its button had been clicked.
    fn open_origin_tab(&self, frag: &mut Fragment, bar: NodeId, container: NodeId) {
        for button in frag.child_elements(bar) {
            if frag.text(button).trim() != "Word Origin" {
                continue;
            }
            frag.add_class(button, "clicked");
            let Some(index) = frag.attr(button, "data-tab").map(str::to_string) else {
                continue;
            };
            for pane in frag.child_elements(container) {
                if frag.attr(pane, "data-tab") == Some(index.as_str()) {
                    frag.show(pane);
                }
            }
        }
    }

    /// Heads of the main entries. Quick-reference boxes repeat the head
    /// markup and must not count as homographs.
    fn entry_heads(&self, frag: &Fragment, root: NodeId) -> Vec<NodeId> {
        frag.select(root, &Selector::parse(".entryhead"))
            .into_iter()
            .filter(|&head| {
                frag.parent(head)
                    .map(|p| frag.has_class(p, "entry"))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Homograph numbers read "1" in the source HTML; with more than one
    /// entry head they become "1/N".
    fn number_homographs(&self, frag: &mut Fragment, root: NodeId) {
        let heads = self.entry_heads(frag, root);
        if heads.len() < 2 {
            return;
        }
        let total = heads.len();
        for head in heads {
            for homnum in frag.select(head, &Selector::parse(".homnum")) {
                let numbered = format!("{}/{}", frag.text(homnum).trim(), total);
                frag.set_text(homnum, &numbered);
            }
        }
    }

    fn jump_candidate_class(class: &str) -> &str {
        match class {
            "phrv" => "phrvbhwd",
            "phrvbhwd" => "phrv",
            other => other,
        }
    }

    /// Wires in-fragment jumps: each signpost, phrasal-verb mention, or
    /// lexical unit links to the first element of its paired class with
    /// the same normalized text. Targets get random ids so repeated
    /// lookups of the same word never collide.
    fn wire_jumps(&self, frag: &mut Fragment, root: NodeId) {
        let mut rng = SmallRng::from_entropy();
        let in_plain_at_link = |frag: &Fragment, id: NodeId| {
            frag.closest(id, |f, a| f.has_class(a, "at-link"))
                .map(|a| !frag.has_class(a, "entrymenu"))
                .unwrap_or(false)
        };
        let sources = frag.select(root, &JUMP_SOURCE_SEL);
        for source in sources {
            if in_plain_at_link(frag, source) {
                continue;
            }
            let already_linked = frag
                .parent(source)
                .map(|p| frag.has_class(p, "jump"))
                .unwrap_or(false);
            if already_linked {
                continue;
            }
            let Some(source_class) = frag.first_class(source) else {
                continue;
            };
            let wanted = Self::jump_candidate_class(&source_class);
            let text = normalize_text(&frag.text(source));
            if text.is_empty() {
                continue;
            }
            let target = frag
                .select(root, &Selector::parse(&format!(".{wanted}")))
                .into_iter()
                .filter(|&c| c != source)
                .filter(|&c| {
                    // Quick-reference duplicates are not jump targets
                    // unless they sit in the entry menu.
                    !in_plain_at_link(frag, c)
                })
                .find(|&c| normalize_text(&frag.text(c)) == text);
            if let Some(target) = target {
                self.link_to(frag, source, target, &mut rng);
            }
        }

        // Homograph heads cycle into each other.
        let heads = self.entry_heads(frag, root);
        if heads.len() > 1 {
            for (i, &head) in heads.iter().enumerate() {
                let next = heads[(i + 1) % heads.len()];
                let hwd = frag
                    .child_elements(head)
                    .into_iter()
                    .find(|&c| frag.has_class(c, "hwd"));
                if let Some(hwd) = hwd {
                    self.link_to(frag, hwd, next, &mut rng);
                }
            }
        }
    }

    fn link_to(&self, frag: &mut Fragment, source: NodeId, target: NodeId, rng: &mut SmallRng) {
        let id = match frag.attr(target, "id") {
            Some(existing) => existing.to_string(),
            None => {
                let id = random_id(rng);
                frag.set_attr(target, "id", &id);
                id
            }
        };
        let anchor = frag.create_element("a");
        frag.set_attr(anchor, "href", &format!("#{id}"));
        frag.set_class(anchor, "jump");
        frag.wrap(source, anchor);
    }

    /// Empty translated-layer nodes are dropped; the rest follow the
    /// bilingual default.
    fn prune_and_toggle_cn(&self, frag: &mut Fragment, root: NodeId) {
        for cn in frag.select(root, &CN_SEL) {
            if normalize_text(&frag.text(cn)).is_empty() {
                frag.remove(cn);
            } else {
                frag.set_visible(cn, self.options.default_show_cn);
            }
        }
    }

    fn section_entries(
        &self,
        frag: &Fragment,
        section: NodeId,
    ) -> Option<(String, Vec<(String, NodeId)>)> {
        let heading = frag
            .select_first(section, &Selector::parse(".heading"))
            .map(|h| normalize_text(&frag.text(h)))?;
        let mut entries = Vec::new();
        for entry in frag.select(section, &SECTION_ENTRY_SEL) {
            let tag = frag
                .child_elements(entry)
                .into_iter()
                .find(|&c| frag.has_class(c, "exp") || frag.has_class(c, "colloc"))
                .map(|t| normalize_text(&frag.text(t)));
            if let Some(tag) = tag {
                entries.push((tag, entry));
            }
        }
        Some((heading, entries))
    }

    /// Merges detailed thesaurus/collocation content into the matching
    /// quick-reference placeholders. The first occurrence of a tag in the
    /// detailed sections wins; unmatched pairings on either side merge
    /// nothing.
    fn merge_cross_references(&self, frag: &mut Fragment, root: NodeId) {
        let mut base: HashMap<(String, String), NodeId> = HashMap::new();
        for at_link in frag.select(root, &Selector::parse(".at-link")) {
            for section in frag.select(at_link, &Selector::parse(".section")) {
                if let Some((topic, entries)) = self.section_entries(frag, section) {
                    for (tag, entry) in entries {
                        base.insert((topic.clone(), tag), entry);
                    }
                }
            }
        }
        if base.is_empty() {
            return;
        }

        let mut refer: HashMap<(String, String), NodeId> = HashMap::new();
        for boxed in frag.select(root, &Selector::parse(".thesbox, .collobox")) {
            for section in frag.select(boxed, &Selector::parse(".section")) {
                if let Some((topic, entries)) = self.section_entries(frag, section) {
                    for (tag, entry) in entries {
                        refer.entry((topic.clone(), tag)).or_insert(entry);
                    }
                }
            }
        }

        for (key, &entry) in &base {
            let Some(&detailed) = refer.get(key) else {
                continue;
            };
            let placeholder = frag
                .child_elements(entry)
                .into_iter()
                .find(|&c| frag.has_class(c, "content"));
            let Some(placeholder) = placeholder else {
                continue;
            };
            let clone = frag.clone_subtree(detailed);
            for child in frag.child_elements(clone) {
                if frag.has_class(child, "exp") || frag.has_class(child, "colloc") {
                    frag.remove(child);
                }
            }
            frag.set_class(clone, "content");
            frag.replace(placeholder, clone);
        }
    }

    fn cleanup_after_merge(&self, frag: &mut Fragment, root: NodeId) {
        let at_links = frag.select(root, &Selector::parse(".at-link"));
        for &at_link in &at_links {
            for doomed in frag.select(
                at_link,
                &Selector::parse(".hwd, .homnum, .etymology"),
            ) {
                frag.remove(doomed);
            }
            for entry in frag.select(at_link, &SECTION_ENTRY_SEL) {
                if frag
                    .select_first(entry, &Selector::parse(".category"))
                    .is_some()
                {
                    frag.remove(entry);
                }
            }
        }
        for boxed in frag.select(root, &Selector::parse(".thesbox, .collobox")) {
            frag.remove(boxed);
        }
        for at_link in at_links {
            if frag.child_elements(at_link).is_empty()
                && normalize_text(&frag.text(at_link)).is_empty()
            {
                frag.remove(at_link);
            }
        }
    }

    /// Collects the fold groups and attaches the sense-number affordance:
    /// a double arrow when the sense owns foldable content, a short single
    /// arrow otherwise.
    fn prepare_fold_groups(&self, frag: &mut Fragment, root: NodeId) -> FoldGroups {
        let mut groups = FoldGroups::default();
        groups.fold_set = frag
            .select(root, &FOLDABLE_SEL)
            .into_iter()
            .filter(|&id| outside_boxes(frag, id))
            .collect();
        for boxed in frag.select(root, &BOX_SEL) {
            for head in frag.child_elements(boxed) {
                if frag.has_class(head, "heading") && !frag.has_class(head, "newline") {
                    groups.box_heads.push(head);
                    groups.fold_set.extend(frag.siblings(head));
                }
            }
        }

        let senses_with_content: Vec<NodeId> = groups
            .fold_set
            .iter()
            .filter_map(|&id| frag.closest(id, |f, a| f.has_class(a, "sense")))
            .collect();
        for sensenum in frag.select(root, &Selector::parse(".sensenum")) {
            let Some(sense) = frag.parent(sensenum) else {
                continue;
            };
            if !frag.has_class(sense, "sense") {
                continue;
            }
            frag.add_class(sensenum, "treated");
            groups.sense_numbers.push(sensenum);
            let afternum = frag.create_element("span");
            frag.set_class(afternum, "afternum");
            if senses_with_content.contains(&sense) {
                for part in ["arrow1", "arrow2"] {
                    let arrow = frag.create_element("span");
                    frag.set_class(arrow, part);
                    frag.append_child(afternum, arrow);
                }
            } else {
                frag.add_class(afternum, "arrow0");
                frag.add_class(sensenum, "short");
            }
            frag.append_child(sensenum, afternum);
        }
        groups
    }

    /// Ensures every entry carries a button bar and gives bars their fold
    /// and bilingual buttons.
    fn scaffold_buttons(&self, frag: &mut Fragment, root: NodeId, groups: &FoldGroups) {
        for entry in frag.select(root, &Selector::parse(".entry, .phrventry")) {
            if frag
                .select_first(entry, &Selector::parse(".buttons"))
                .is_some()
            {
                continue;
            }
            let Some(head) = frag.select_first(entry, &Selector::parse(".entryhead")) else {
                continue;
            };
            let bar = frag.create_element("div");
            let class = if frag.has_class(entry, "phrventry") {
                "buttons soft nochn"
            } else {
                "buttons soft"
            };
            frag.set_class(bar, class);
            frag.append_child(head, bar);
        }
        if frag
            .select_first(root, &Selector::parse(".buttons"))
            .is_none()
        {
            let lexunit = frag
                .select(root, &Selector::parse(".lexunit"))
                .into_iter()
                .find(|&id| {
                    frag.parent(id)
                        .map(|p| frag.has_class(p, "sense"))
                        .unwrap_or(false)
                });
            if let Some(lexunit) = lexunit {
                let bar = frag.create_element("div");
                frag.set_class(bar, "buttons soft");
                frag.append_child(lexunit, bar);
            }
        }

        let has_foldable = !groups.fold_set.is_empty();
        for bar in frag.select(root, &Selector::parse(".buttons")) {
            // Each bar stands for its own entry; a sibling entry's sense
            // numbers do not satisfy this one.
            let owner = frag.closest(bar, |f, a| {
                f.has_class(a, "entry") || f.has_class(a, "phrventry") || f.has_class(a, "lexunit")
            });
            let has_sense_affordance = groups.sense_numbers.iter().any(|&sn| {
                frag.is_visible(sn)
                    && match owner {
                        Some(owner) => frag.closest(sn, |_, a| a == owner).is_some(),
                        None => true,
                    }
            });
            if has_foldable && !has_sense_affordance {
                let fold = frag.create_element("span");
                let class = if self.options.default_fold {
                    "kbtn fold clicked"
                } else {
                    "kbtn fold"
                };
                frag.set_class(fold, class);
                frag.set_text(fold, "\u{2630}");
                frag.prepend_child(bar, fold);
            }
            if !frag.has_class(bar, "nochn") {
                let cn = frag.create_element("span");
                frag.set_class(cn, "kbtn cn");
                frag.set_text(cn, "\u{4e2d}");
                if !self.options.show_cn_button {
                    frag.hide(cn);
                }
                frag.prepend_child(bar, cn);
            }
        }
    }

    fn mark_thesaurus_pointers(&self, frag: &mut Fragment, root: NodeId) {
        for thesaurus in frag.select(root, &Selector::parse(".thesaurus")) {
            if frag.text(thesaurus).trim() == "\u{25ba}" {
                frag.add_class(thesaurus, "up");
            }
        }
    }

    /// Word-family members link out through the fragment's outer jump
    /// template, with the placeholder token replaced by the word.
    fn link_word_family(&self, frag: &mut Fragment, root: NodeId) {
        let template = frag
            .select(root, &Selector::parse(".hide"))
            .into_iter()
            .filter_map(|hide| {
                frag.child_elements(hide)
                    .into_iter()
                    .find(|&c| frag.has_class(c, "outerjump"))
            })
            .next()
            .and_then(|jump| frag.attr(jump, "href").map(str::to_string));
        let Some(template) = template else {
            return;
        };
        for wfwd in frag.select(root, &Selector::parse(".wfwd")) {
            let word = normalize_text(&frag.text(wfwd));
            if word.is_empty() {
                continue;
            }
            let encoded = utf8_percent_encode(&word, NON_ALPHANUMERIC).to_string();
            let anchor = frag.create_element("a");
            frag.set_attr(anchor, "href", &template.replace("kreplace", &encoded));
            frag.set_class(anchor, "wflink");
            frag.wrap(wfwd, anchor);
        }
    }

    /// Word-set entries cycle through ten tier classes for styling.
    fn tier_word_sets(&self, frag: &mut Fragment, root: NodeId) {
        for (i, wswd) in frag
            .select(root, &Selector::parse(".wswd"))
            .into_iter()
            .enumerate()
        {
            frag.add_class(wswd, &format!("topic_{}", (i % 10) + 1));
        }
    }

    fn collapse_spoken_sections(&self, frag: &mut Fragment, root: NodeId) {
        for section in frag.select(root, &Selector::parse(".spokesect")) {
            let head = frag
                .child_elements(section)
                .into_iter()
                .find(|&c| frag.has_class(c, "heading"));
            let Some(head) = head else {
                continue;
            };
            frag.remove_class(head, "opened");
            for sibling in frag.siblings(head) {
                frag.hide(sibling);
            }
        }
    }

    /// Category fragments list a word set per vocabulary tier; the slider
    /// above the list selects the visible tiers.
    fn insert_level_slider(&self, frag: &mut Fragment, root: NodeId) {
        if !frag.has_class(root, "category") {
            return;
        }
        let Some(head) = frag.select_first(root, &Selector::parse(".topic_head")) else {
            return;
        };
        let container = frag.create_element("div");
        frag.set_class(container, "slider-container");
        let track = frag.create_element("div");
        frag.set_class(track, "slider-track");
        let thumb = frag.create_element("div");
        frag.set_class(thumb, "slider-thumb");
        frag.append_child(track, thumb);
        frag.append_child(container, track);
        frag.insert_after(head, container);
        widgets::apply_topic_level(frag, root, self.options.default_topic_level);
    }

    fn mark_translatable(&self, frag: &mut Fragment, root: NodeId) {
        if !self.options.translation {
            return;
        }
        for block in frag.select(root, &TRANSLATABLE_SEL) {
            frag.set_attr(block, "data-translatable", "");
        }
        for exas in frag.select(root, &Selector::parse(".exas")) {
            for li in frag.child_elements(exas) {
                if frag.tag(li) == Some("li") {
                    frag.set_attr(li, "data-translatable", "");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;

    fn enrich_html(html: &str, options: Options) -> Fragment {
        let mut frag = Fragment::parse(html);
        let enricher = Enricher::new(options, Theme::Light);
        assert!(enricher.enrich(&mut frag));
        frag
    }

    fn sel(frag: &Fragment, selector: &str) -> Vec<NodeId> {
        frag.select(frag.root(), &Selector::parse(selector))
    }

    #[test]
    fn pass_is_guarded_by_marker() {
        let mut frag = Fragment::parse(r#"<div class="lexfold"><td class="header">h</td></div>"#);
        let enricher = Enricher::new(Options::default(), Theme::Light);
        assert!(enricher.enrich(&mut frag));
        let after_first = frag.to_html();
        assert!(!enricher.enrich(&mut frag));
        assert_eq!(frag.to_html(), after_first);
    }

    #[test]
    fn no_root_is_a_no_op() {
        let mut frag = Fragment::parse("<div><p>plain</p></div>");
        let before = frag.to_html();
        assert!(!Enricher::new(Options::default(), Theme::Light).enrich(&mut frag));
        assert_eq!(frag.to_html(), before);
    }

    #[test]
    fn header_cells_widen_and_grammar_abbreviates() {
        let frag = enrich_html(
            r#"<div class="lexfold"><table><tr><td class="header">x</td></tr></table><span class="gram">[countable, usually plural]</span></div>"#,
            Options::default(),
        );
        let td = sel(&frag, "td.header")[0];
        assert_eq!(frag.attr(td, "colspan"), Some("100"));
        let gram = sel(&frag, ".gram")[0];
        assert_eq!(frag.text(gram), "\u{27e8}C, usu pl\u{27e9}");
    }

    #[test]
    fn shorthand_preserves_nested_markup() {
        let frag = enrich_html(
            r#"<div class="lexfold"><span class="propform">give <b>something</b> to somebody</span></div>"#,
            Options::default(),
        );
        let prop = sel(&frag, ".propform")[0];
        assert_eq!(frag.text(prop), "give sth. to sb.");
        assert_eq!(sel(&frag, "b").len(), 1);
    }

    #[test]
    fn empty_cn_pruned_and_rest_follow_default() {
        let html = r#"<div class="lexfold"><span class="def">meaning</span><span class="defcn">  </span><span class="collocn">翻译</span></div>"#;
        let frag = enrich_html(html, Options::default());
        assert!(sel(&frag, ".defcn").is_empty());
        let cn = sel(&frag, ".collocn")[0];
        assert!(frag.is_visible(cn));

        let frag = enrich_html(
            html,
            Options {
                default_show_cn: false,
                ..Options::default()
            },
        );
        let cn = sel(&frag, ".collocn")[0];
        assert!(!frag.is_visible(cn));
    }

    #[test]
    fn homographs_numbered_and_cyclically_linked() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="entry"><div class="entryhead"><span class="hwd">bank</span><span class="homnum">1</span></div></div><div class="entry"><div class="entryhead"><span class="hwd">bank</span><span class="homnum">2</span></div></div></div>"#,
            Options::default(),
        );
        let homnums = sel(&frag, ".homnum");
        assert_eq!(frag.text(homnums[0]), "1/2");
        assert_eq!(frag.text(homnums[1]), "2/2");
        let heads = sel(&frag, ".entryhead");
        // Each head got an id and each hwd is wrapped in a jump anchor.
        for head in &heads {
            assert!(frag.attr(*head, "id").is_some());
        }
        assert_eq!(sel(&frag, "a.jump").len(), 2);
    }

    #[test]
    fn phrv_jump_skips_quick_reference_candidates() {
        let frag = enrich_html(
            "<div class=\"lexfold\"><span class=\"phrv\">set off</span><div class=\"at-link\"><span class=\"phrvbhwd\">set off</span></div><span class=\"phrvbhwd\">set  off \u{2194}</span></div>",
            Options::default(),
        );
        // The phrv and the body headword link to each other; the at-link
        // duplicate is neither a source nor a target.
        let anchors = sel(&frag, "a.jump");
        assert_eq!(anchors.len(), 2);
        let targets = sel(&frag, ".phrvbhwd");
        let at_link_candidate = targets
            .iter()
            .find(|&&t| frag.closest(t, |f, a| f.has_class(a, "at-link")).is_some())
            .unwrap();
        assert!(frag.attr(*at_link_candidate, "id").is_none());
        let phrv = sel(&frag, ".phrv")[0];
        assert!(frag.attr(phrv, "id").is_some());
    }

    fn cross_ref_html() -> String {
        r#"<div class="lexfold">
            <div class="at-link"><div class="section"><span class="heading">MONEY</span>
              <div class="exponent"><span class="exp">deposit</span><div class="content">placeholder</div></div>
              <div class="exponent"><span class="exp">withdraw</span><div class="content">placeholder</div></div>
            </div></div>
            <div class="thesbox"><div class="section"><span class="heading">MONEY</span>
              <div class="exponent"><span class="exp">deposit</span>first detailed</div>
              <div class="exponent"><span class="exp">deposit</span>second detailed</div>
            </div></div>
        </div>"#
            .to_string()
    }

    #[test]
    fn cross_reference_merge_first_wins_and_one_sided_skips() {
        let frag = enrich_html(&cross_ref_html(), Options::default());
        // The detailed source boxes are removed by cleanup.
        assert!(sel(&frag, ".thesbox").is_empty());
        let contents = sel(&frag, ".content");
        let merged: Vec<String> = contents.iter().map(|&c| frag.text(c)).collect();
        // "deposit" merged from the FIRST detailed occurrence, exactly once.
        assert_eq!(
            merged
                .iter()
                .filter(|t| t.contains("first detailed"))
                .count(),
            1
        );
        assert!(!merged.iter().any(|t| t.contains("second detailed")));
        // "withdraw" had no detailed side and kept its placeholder.
        assert_eq!(merged.iter().filter(|t| *t == "placeholder").count(), 1);
        // The merged clone dropped its tag child.
        let merged_node = contents
            .iter()
            .find(|&&c| frag.text(c).contains("first detailed"))
            .unwrap();
        assert!(frag
            .select_first(*merged_node, &Selector::parse(".exp"))
            .is_none());
    }

    #[test]
    fn cleanup_drops_headwords_and_empty_boxes() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="at-link"><span class="hwd">bank</span><span class="homnum">1</span></div><div class="at-link"><div class="section"><span class="heading">T</span></div></div></div>"#,
            Options::default(),
        );
        // First box lost all children and was removed with them.
        assert_eq!(sel(&frag, ".at-link").len(), 1);
        assert!(sel(&frag, ".hwd").is_empty());
    }

    #[test]
    fn fold_default_hides_content_and_affordances() {
        let html = r#"<div class="lexfold"><div class="sense"><span class="sensenum">1</span><span class="example">an example</span></div><div class="sense"><span class="sensenum">2</span></div></div>"#;

        let frag = enrich_html(html, Options::default());
        let example = sel(&frag, ".example")[0];
        assert!(frag.is_visible(example));
        let nums = sel(&frag, ".sensenum");
        assert!(frag.has_class(nums[0], "treated"));
        assert!(frag.has_class(nums[0], "opened"));
        // Sense 2 has no foldable content: short affordance.
        assert!(frag.has_class(nums[1], "short"));
        assert_eq!(sel(&frag, ".afternum.arrow0").len(), 1);

        let frag = enrich_html(
            html,
            Options {
                default_fold: true,
                ..Options::default()
            },
        );
        let example = sel(&frag, ".example")[0];
        assert!(!frag.is_visible(example));
        let nums = sel(&frag, ".sensenum");
        assert!(!frag.has_class(nums[0], "opened"));
    }

    #[test]
    fn box_heads_fold_their_siblings() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="grambox"><span class="heading">GRAMMAR</span><span class="body">rule</span></div></div>"#,
            Options {
                default_fold: true,
                ..Options::default()
            },
        );
        let head = sel(&frag, ".heading")[0];
        assert!(frag.has_class(head, "closed"));
        let body = sel(&frag, ".body")[0];
        assert!(!frag.is_visible(body));
    }

    #[test]
    fn buttons_scaffolded_with_fold_and_cn() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="entry"><div class="entryhead"><span class="hwd">run</span></div><span class="example">ex</span></div></div>"#,
            Options::default(),
        );
        let bars = sel(&frag, ".buttons");
        assert_eq!(bars.len(), 1);
        // No sense numbers here, so the bar carries the fold button.
        assert_eq!(sel(&frag, ".kbtn.fold").len(), 1);
        let cn = sel(&frag, ".kbtn.cn")[0];
        assert!(!frag.is_visible(cn));

        let frag = enrich_html(
            r#"<div class="lexfold"><div class="phrventry"><div class="entryhead"><span class="hwd">run</span></div></div></div>"#,
            Options {
                show_cn_button: true,
                ..Options::default()
            },
        );
        let bar = sel(&frag, ".buttons")[0];
        assert!(frag.has_class(bar, "nochn"));
        assert!(sel(&frag, ".kbtn.cn").is_empty());
    }

    #[test]
    fn tabs_move_panes_and_drop_word_sets_button() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="wrap"><div class="buttons"><span class="popup">Thesaurus</span><span class="popup">word sets</span></div><div class="at-link">pane</div></div></div>"#,
            Options::default(),
        );
        let containers = sel(&frag, ".tab-content");
        assert_eq!(containers.len(), 1);
        let pane = sel(&frag, ".at-link")[0];
        assert_eq!(frag.parent(pane), Some(containers[0]));
        assert_eq!(frag.attr(pane, "data-tab"), Some("0"));
        let buttons = sel(&frag, ".popup");
        assert_eq!(buttons.len(), 1);
        assert_eq!(frag.attr(buttons[0], "data-tab"), Some("0"));
    }

    #[test]
    fn quick_reference_heads_do_not_count_as_homographs() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="entry"><div class="entryhead"><span class="hwd">tip</span><span class="homnum">1</span></div></div><div class="entry"><div class="entryhead"><span class="hwd">tip</span><span class="homnum">2</span></div></div><div class="at-link"><div class="entryhead"><span class="hwd">tip</span><span class="homnum">1</span></div></div></div>"#,
            Options::default(),
        );
        // The duplicate head in the quick-reference box neither counts
        // toward the denominator nor joins the head cycle.
        let homnums = sel(&frag, ".homnum");
        assert_eq!(homnums.len(), 2);
        assert_eq!(frag.text(homnums[0]), "1/2");
        assert_eq!(frag.text(homnums[1]), "2/2");
        let at_link_head = sel(&frag, ".entryhead")
            .into_iter()
            .find(|&h| frag.closest(h, |f, a| f.has_class(a, "at-link")).is_some())
            .unwrap();
        assert!(frag.attr(at_link_head, "id").is_none());
    }

    #[test]
    fn fold_button_is_decided_per_entry() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="entry"><div class="entryhead"><span class="hwd">set</span></div><div class="sense"><span class="sensenum">1</span><span class="example">ex</span></div></div><div class="phrventry"><div class="entryhead"><span class="phrvbhwd">set off</span></div><span class="example">phr ex</span></div></div>"#,
            Options::default(),
        );
        // The main entry's visible sense affordance suppresses its own
        // fold button, not the phrasal entry's.
        let folds = sel(&frag, ".kbtn.fold");
        assert_eq!(folds.len(), 1);
        assert!(
            frag.closest(folds[0], |f, a| f.has_class(a, "phrventry"))
                .is_some()
        );
    }

    #[test]
    fn auto_show_origin_opens_the_origin_tab() {
        let html = r#"<div class="lexfold"><div class="wrap"><div class="buttons"><span class="popup">Thesaurus</span><span class="popup">Word Origin</span></div><div class="at-link">thesaurus pane</div><div class="at-link">origin pane</div></div></div>"#;
        let frag = enrich_html(
            html,
            Options {
                auto_show_origin: true,
                ..Options::default()
            },
        );
        let buttons = sel(&frag, ".popup");
        assert!(!frag.has_class(buttons[0], "clicked"));
        assert!(frag.has_class(buttons[1], "clicked"));

        let frag = enrich_html(html, Options::default());
        let buttons = sel(&frag, ".popup");
        assert!(!frag.has_class(buttons[1], "clicked"));
    }

    #[test]
    fn word_sets_tiered_and_family_linked() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="hide"><a class="outerjump" href="entry://kreplace"></a></div><span class="wfwd">happy</span><span class="wswd">a</span><span class="wswd">b</span></div>"#,
            Options::default(),
        );
        let wswd = sel(&frag, ".wswd");
        assert!(frag.has_class(wswd[0], "topic_1"));
        assert!(frag.has_class(wswd[1], "topic_2"));
        let link = sel(&frag, "a.wflink")[0];
        assert_eq!(frag.attr(link, "href"), Some("entry://happy"));
    }

    #[test]
    fn category_root_gets_slider_and_level_filter() {
        let frag = enrich_html(
            r#"<div class="lexfold category"><div class="topic_head">Clothes</div><span class="wswd level1">sock</span><span class="wswd level3">cravat</span></div>"#,
            Options::default(),
        );
        assert_eq!(sel(&frag, ".slider-container").len(), 1);
        let l1 = sel(&frag, ".level1")[0];
        let l3 = sel(&frag, ".level3")[0];
        // Default level 1 shows tier 1 and hides tier 3.
        assert!(frag.is_visible(l1));
        assert!(!frag.is_visible(l3));
    }

    #[test]
    fn translation_markers_follow_option() {
        let html = r#"<div class="lexfold"><span class="example">ex</span><ul class="exas"><li>one</li></ul></div>"#;
        let frag = enrich_html(html, Options::default());
        let example = sel(&frag, ".example")[0];
        assert!(frag.attr(example, "data-translatable").is_some());
        let li = sel(&frag, "li")[0];
        assert!(frag.attr(li, "data-translatable").is_some());

        let frag = enrich_html(
            html,
            Options {
                translation: false,
                ..Options::default()
            },
        );
        let example = sel(&frag, ".example")[0];
        assert!(frag.attr(example, "data-translatable").is_none());
    }

    #[test]
    fn only_cn_hides_original_layer() {
        let frag = enrich_html(
            r#"<div class="lexfold"><span class="def">meaning</span><span class="defcn">翻译</span></div>"#,
            Options {
                only_cn: true,
                ..Options::default()
            },
        );
        let def = sel(&frag, ".def")[0];
        assert!(!frag.is_visible(def));
        let cn = sel(&frag, ".defcn")[0];
        assert!(frag.has_class(cn, "only"));
    }

    #[test]
    fn theme_applied_to_root() {
        let mut frag =
            Fragment::parse(r#"<div class="lexfold"><span class="def">x</span></div>"#);
        assert!(Enricher::new(Options::default(), Theme::Dark).enrich(&mut frag));
        let root = sel(&frag, ".lexfold")[0];
        assert_eq!(frag.attr(root, "data-theme"), Some("dark"));
    }

    #[test]
    fn spoken_sections_start_collapsed() {
        let frag = enrich_html(
            r#"<div class="lexfold"><div class="spokesect"><span class="heading opened">SPOKEN</span><span class="body">phrases</span></div></div>"#,
            Options::default(),
        );
        let head = sel(&frag, ".heading")[0];
        assert!(!frag.has_class(head, "opened"));
        let body = sel(&frag, ".body")[0];
        assert!(!frag.is_visible(body));
    }
}
