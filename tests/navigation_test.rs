//! Integration tests for the navigation engine.

use std::sync::Arc;

use quickjump::document::{
    ControlField, Direction, ElementKind, ElementState, FormatField, Paragraph, TextBlock, TextDocument,
};
use quickjump::engine::{
    HierarchyRequest, JumpOutcome, JumpRequest, NavigationOptions, Navigator, Relation, NO_RULES_MESSAGE,
};
use quickjump::error::Error;
use quickjump::feedback::{AudioEvent, RecordingAudio, RecordingSpeech, SKIP_CHIME};
use quickjump::keys::{Action, KeyBlocker};
use quickjump::model::{
    Attribute, AttributeMatch, Bookmark, BookmarkCategory, BookmarkData, Config, PatternMatch, Role, Site, UrlMatch,
};

const URL: &str = "https://news.example.org/today";

fn config(bookmarks: Vec<Arc<Bookmark>>) -> Config {
    Config::new(vec![
        Site::new("example.org", UrlMatch::Subdomain).with_bookmarks(bookmarks)
    ])
}

fn sections() -> Arc<TextDocument> {
    TextDocument::from_plain_text("Intro\nSection A\n  item 1\n  item 2\nSection B")
}

fn outline() -> Arc<TextDocument> {
    TextDocument::from_plain_text("Intro\n* top\n  * nested\n    * deep\n  * nested again\n* top again")
}

fn recording(options: NavigationOptions) -> (Navigator, Arc<RecordingAudio>, Arc<RecordingSpeech>) {
    let audio = Arc::new(RecordingAudio::new());
    let speech = Arc::new(RecordingSpeech::new());
    (Navigator::new(options, audio.clone(), speech.clone()), audio, speech)
}

fn caret(doc: &Arc<TextDocument>) -> Paragraph {
    Paragraph::new(doc.caret())
}

fn index(doc: &TextDocument, outcome: &JumpOutcome) -> Option<usize> {
    outcome.target().and_then(|p| doc.paragraph_index(p))
}

fn section_rule() -> Arc<Bookmark> {
    BookmarkData::new(BookmarkCategory::QuickJump, "^Section", PatternMatch::Regex).build()
}

#[test]
fn test_jump_between_sections() {
    let doc = sections();
    let rules = config(vec![section_rule()]);
    let navigator = Navigator::default();
    let request = JumpRequest::forward(URL, BookmarkCategory::QuickJump);

    let first = navigator.quick_jump(&rules, &caret(&doc), &request).unwrap();
    let JumpOutcome::Matched(jump) = &first else {
        panic!("expected a match, got {:?}", first);
    };
    assert_eq!(doc.paragraph_index(&jump.target), Some(1));
    assert_eq!(jump.distance, 1);
    assert_eq!(doc.caret_paragraph(), Some(1));

    let second = navigator.quick_jump(&rules, &caret(&doc), &request).unwrap();
    let JumpOutcome::Matched(jump) = &second else {
        panic!("expected a match, got {:?}", second);
    };
    assert_eq!(doc.paragraph_index(&jump.target), Some(4));
    // paragraphs advanced from Section A: item 1, item 2, Section B
    assert_eq!(jump.distance, 3);
    assert_eq!(doc.caret_paragraph(), Some(4));

    let back = navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::backward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    assert_eq!(index(&doc, &back), Some(1));
}

#[test]
fn test_end_of_document() {
    let doc = sections();
    doc.set_caret_paragraph(4);
    let rules = config(vec![section_rule()]);
    let (navigator, audio, speech) = recording(NavigationOptions::default());

    let outcome = navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
    assert_eq!(doc.caret_paragraph(), Some(4));
    assert_eq!(
        audio.events(),
        vec![AudioEvent::Chord {
            chord: "HF".into(),
            duration_ms: 100,
            left: 50,
            right: 50
        }]
    );
    assert_eq!(speech.spoken(), vec!["No next QuickJump result".to_string()]);
}

#[test]
fn test_end_of_document_quietly() {
    let doc = sections();
    doc.set_caret_paragraph(4);
    let rules = config(vec![section_rule()]);
    let options = NavigationOptions::default().with_chime_volume(0).with_end_message(false);
    let (navigator, audio, speech) = recording(options);

    navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    assert!(audio.events().is_empty());
    assert!(speech.spoken().is_empty());
}

#[test]
fn test_other_sites_do_not_apply() {
    let doc = sections();
    let rules = config(vec![section_rule()]);
    let (navigator, _, speech) = recording(NavigationOptions::default());
    let outcome = navigator
        .quick_jump(
            &rules,
            &caret(&doc),
            &JumpRequest::forward("https://elsewhere.net/", BookmarkCategory::QuickJump),
        )
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::NoRules));
    assert_eq!(speech.spoken(), vec![NO_RULES_MESSAGE.to_string()]);
}

#[test]
fn test_negative_offset_does_not_rematch_anchor() {
    // Each label sits under the value it names; jumping lands on the value.
    let doc = TextDocument::from_plain_text("42\nAnswer\n7\nCount");
    let rules = config(vec![BookmarkData::new(
        BookmarkCategory::QuickJump,
        "^(Answer|Count)$",
        PatternMatch::Regex,
    )
    .with_offset(-1)
    .build()]);
    let navigator = Navigator::default();
    let request = JumpRequest::forward(URL, BookmarkCategory::QuickJump);

    let outcome = navigator.quick_jump(&rules, &caret(&doc), &request).unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));
    let outcome = navigator.quick_jump(&rules, &caret(&doc), &request).unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
}

#[test]
fn test_attribute_filters() {
    let doc = TextDocument::new(vec![
        TextBlock::new("Home"),
        TextBlock::new("Next page").with_control(ControlField::new(Role::Button)),
        TextBlock::new("Next page").with_control(ControlField::new(Role::Link)),
    ]);
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickJump, "Next", PatternMatch::Substring)
        .with_attribute(AttributeMatch::new(Attribute::Role(Role::Link)))
        .with_attribute(AttributeMatch::not(Attribute::Role(Role::Button)))
        .build()]);
    let outcome = Navigator::default()
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));
}

#[test]
fn test_list_order_breaks_ties() {
    let doc = TextDocument::from_plain_text("start\nnews: weather today");
    let first = BookmarkData::new(BookmarkCategory::QuickJump, "weather", PatternMatch::Substring)
        .with_name("weather")
        .build();
    let second = BookmarkData::new(BookmarkCategory::QuickJump, "news", PatternMatch::Substring)
        .with_name("news")
        .build();
    let rules = config(vec![first, second]);
    let outcome = Navigator::default()
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    let JumpOutcome::Matched(jump) = outcome else {
        panic!("expected a match");
    };
    assert_eq!(jump.bookmark.display_name(), "weather");
}

#[test]
fn test_quick_click_activates_target() {
    let doc = TextDocument::from_plain_text("Title\nAccept cookies\nBody");
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickClick, "Accept", PatternMatch::Substring).build()]);
    let outcome = Navigator::default()
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickClick))
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Matched(_)));
    assert_eq!(doc.caret_paragraph(), Some(1));
    assert_eq!(doc.activations(), vec![1]);
}

#[test]
fn test_quick_speak_leaves_caret() {
    let doc = TextDocument::from_plain_text("Title\nScore: 3-1\nBody");
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickSpeak, "^Score", PatternMatch::Regex)
        .with_message("Latest score")
        .build()]);
    let (navigator, _, speech) = recording(NavigationOptions::default());
    let outcome = navigator
        .perform(&rules, URL, &caret(&doc), Action::QuickSpeak(BookmarkCategory::QuickSpeak))
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Announced(_)));
    assert_eq!(doc.caret_paragraph(), Some(0));
    assert_eq!(speech.spoken(), vec!["Latest score".to_string(), "Score: 3-1".to_string()]);
}

#[test]
fn test_auto_click_searches_whole_document() {
    let doc = TextDocument::from_plain_text("Play\nText\nMore text");
    doc.set_caret_paragraph(2);
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickClick, "Play", PatternMatch::Exact).build()]);
    let outcome = Navigator::default()
        .auto_click(&rules, URL, &caret(&doc), BookmarkCategory::QuickClick)
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Clicked(_)));
    assert_eq!(doc.activations(), vec![0]);
    assert_eq!(doc.caret_paragraph(), Some(2));
}

#[test]
fn test_auto_click_on_focus() {
    let doc = TextDocument::from_plain_text("Show more\ntext\nShow more");
    let mut site = Site::new("example.org", UrlMatch::Subdomain).with_bookmarks(vec![BookmarkData::new(
        BookmarkCategory::QuickClick3,
        "Show more",
        PatternMatch::Exact,
    )
    .build()]);
    site.auto_click_on_focus = true;
    site.auto_click_category = BookmarkCategory::QuickClick3;
    let rules = Config::new(vec![site]);

    let clicked = Navigator::default().on_document_focus(&rules, URL, &caret(&doc));
    assert_eq!(clicked.len(), 2);
    assert_eq!(doc.activations(), vec![0, 2]);
}

#[test]
fn test_skip_clutter_while_moving() {
    let doc = TextDocument::from_plain_text("Headline\nAdvertisement\n\nStory");
    let rules = config(vec![BookmarkData::new(
        BookmarkCategory::SkipClutter,
        "Advertisement",
        PatternMatch::Exact,
    )
    .build()]);
    let (navigator, audio, speech) = recording(NavigationOptions::default().with_beep_volume(0));

    let outcome = navigator
        .move_paragraph(&rules, URL, &caret(&doc), Direction::Forward)
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(3));
    assert_eq!(
        audio.events(),
        vec![AudioEvent::Chime {
            name: SKIP_CHIME.into(),
            volume: 25
        }]
    );
    assert_eq!(speech.spoken(), vec!["Story".to_string()]);

    let outcome = navigator
        .move_paragraph(&rules, URL, &caret(&doc), Direction::Forward)
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
}

#[test]
fn test_keep_empty_paragraphs() {
    let doc = TextDocument::from_plain_text("a\n\nb");
    let navigator = Navigator::silent(NavigationOptions::default().with_skip_empty_paragraphs(false));
    let outcome = navigator
        .move_paragraph(&Config::default(), URL, &caret(&doc), Direction::Forward)
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(1));
}

#[test]
fn test_structural_browsing_by_offset() {
    let doc = sections();
    let navigator = Navigator::default();
    let step = |from: usize, relation: Relation, direction: Direction| {
        doc.set_caret_paragraph(from);
        let outcome = navigator.browse(&caret(&doc), relation, direction).unwrap();
        index(&doc, &outcome)
    };

    assert_eq!(step(0, Relation::Sibling, Direction::Forward), Some(1));
    assert_eq!(step(1, Relation::Child, Direction::Forward), Some(2));
    assert_eq!(step(2, Relation::Sibling, Direction::Forward), Some(3));
    assert_eq!(step(3, Relation::Parent, Direction::Backward), Some(1));
    assert_eq!(step(3, Relation::Parent, Direction::Forward), Some(4));
    assert_eq!(step(4, Relation::Child, Direction::Forward), None);
}

#[test]
fn test_browse_not_found_message() {
    let doc = sections();
    doc.set_caret_paragraph(4);
    let (navigator, _, speech) = recording(NavigationOptions::default());
    let outcome = navigator
        .perform(&Config::default(), URL, &caret(&doc), Action::NextSibling)
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
    assert_eq!(
        speech.spoken(),
        vec!["No next paragraph with the same horizontal offset in the document".to_string()]
    );
}

#[test]
fn test_structural_browsing_by_font() {
    let block = |text: &str, size: &str| {
        TextBlock::new(text).with_format(quickjump::document::FormatField::new().with("font-size", size))
    };
    let doc = TextDocument::new(vec![
        block("Chapter", "24pt"),
        block("body", "12pt"),
        block("Section", "18pt"),
        block("body", "12pt"),
        block("Chapter two", "24pt"),
    ]);
    doc.set_caret_paragraph(3);
    let navigator = Navigator::silent(NavigationOptions::default());
    navigator.rotate_mode();

    let outcome = navigator.perform(&Config::default(), URL, &caret(&doc), Action::Parent).unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));
    let outcome = navigator.perform(&Config::default(), URL, &caret(&doc), Action::NextParent).unwrap();
    assert_eq!(index(&doc, &outcome), Some(4));
}

fn bullets() -> Config {
    config(vec![BookmarkData::new(
        BookmarkCategory::Hierarchical,
        r"^\s*\* ",
        PatternMatch::Regex,
    )
    .build()])
}

#[test]
fn test_hierarchical_any_level() {
    let doc = outline();
    let rules = bullets();
    let (navigator, _, speech) = recording(NavigationOptions::default());

    let outcome = navigator
        .hierarchical_jump(&rules, &caret(&doc), &HierarchyRequest::new(URL, None, Direction::Forward))
        .unwrap();
    let JumpOutcome::Matched(jump) = outcome else {
        panic!("expected a match");
    };
    assert_eq!(doc.paragraph_index(&jump.target), Some(1));
    assert_eq!(jump.level, Some(0));
    assert_eq!(speech.spoken(), vec!["Level 1".to_string(), "* top".to_string()]);
    assert_eq!(navigator.level_cache().len(), 1);
}

#[test]
fn test_hierarchical_levels() {
    let doc = outline();
    let rules = bullets();
    let navigator = Navigator::default();
    let jump = |level: usize| {
        let request = HierarchyRequest::new(URL, Some(level), Direction::Forward);
        navigator.hierarchical_jump(&rules, &caret(&doc), &request).unwrap()
    };

    doc.set_caret_paragraph(1);
    assert_eq!(index(&doc, &jump(1)), Some(2));
    // skips the deeper paragraph
    assert_eq!(index(&doc, &jump(1)), Some(4));
    // the next paragraph is shallower
    assert!(matches!(jump(1), JumpOutcome::LevelBoundary { level: 1 }));
    assert_eq!(doc.caret_paragraph(), Some(4));

    doc.set_caret_paragraph(0);
    assert!(matches!(jump(2), JumpOutcome::LevelBoundary { level: 2 }));
    doc.set_caret_paragraph(2);
    assert_eq!(index(&doc, &jump(2)), Some(3));
}

#[test]
fn test_hierarchical_unbounded() {
    let doc = outline();
    doc.set_caret_paragraph(1);
    let rules = bullets();
    let navigator = Navigator::default();

    let request = HierarchyRequest::new(URL, Some(0), Direction::Forward);
    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &request).unwrap();
    assert_eq!(index(&doc, &outcome), Some(5));

    doc.set_caret_paragraph(2);
    let bounded = HierarchyRequest::new(URL, Some(1), Direction::Backward);
    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &bounded).unwrap();
    assert!(matches!(outcome, JumpOutcome::LevelBoundary { .. }));
    let outcome = navigator
        .hierarchical_jump(&rules, &caret(&doc), &bounded.unbounded())
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
}

#[test]
fn test_hierarchical_offset_bookmark_lands_past_heading() {
    let doc = TextDocument::from_plain_text("Intro\nChapter 1\n    body 1\nChapter 2\n    body 2");
    let rules = config(vec![BookmarkData::new(BookmarkCategory::Hierarchical, "^Chapter", PatternMatch::Regex)
        .with_offset(1)
        .build()]);
    let navigator = Navigator::default();
    let request = HierarchyRequest::new(URL, None, Direction::Forward);

    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &request).unwrap();
    let JumpOutcome::Matched(jump) = &outcome else {
        panic!("expected a match, got {:?}", outcome);
    };
    assert_eq!(doc.paragraph_index(&jump.target), Some(2));
    assert_eq!(jump.level, Some(0));

    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &request).unwrap();
    assert_eq!(index(&doc, &outcome), Some(4));

    let at_level = HierarchyRequest::new(URL, Some(0), Direction::Forward);
    doc.set_caret_paragraph(0);
    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &at_level).unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));
    assert_eq!(navigator.level_cache().len(), 1);
}

#[test]
fn test_stale_levels_are_rescanned() {
    let doc = outline();
    let rules = bullets();
    let navigator = Navigator::default();
    let start = caret(&doc);

    // Seed the cache with levels of the top bullets only.
    let top = vec![BookmarkData::new(BookmarkCategory::Hierarchical, r"^\* ", PatternMatch::Regex).build()];
    assert_eq!(navigator.levels_for(&rules, &start, &top).unwrap().len(), 1);

    doc.set_caret_paragraph(1);
    let request = HierarchyRequest::new(URL, None, Direction::Forward);
    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &request).unwrap();
    assert!(matches!(outcome, JumpOutcome::Inconsistent));
    assert_eq!(doc.caret_paragraph(), Some(1));

    let outcome = navigator.hierarchical_jump(&rules, &caret(&doc), &request).unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));
}

#[test]
fn test_script_bookmark_moves_caret() {
    let doc = sections();
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickJump, "^Section", PatternMatch::Regex)
        .with_snippet("if p.next.text.startswith('  '):\n    match(1, 'first item')")
        .build()]);
    let (navigator, _, speech) = recording(NavigationOptions::default());
    let outcome = navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));
    assert_eq!(speech.spoken(), vec!["first item".to_string(), "  item 1".to_string()]);
}

#[test]
fn test_script_runtime_error_is_announced() {
    let doc = sections();
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickJump, "^Section", PatternMatch::Regex)
        .with_snippet("return 1 // 0")
        .build()]);
    let (navigator, _, speech) = recording(NavigationOptions::default());
    let outcome = navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickJump))
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::ScriptFailed(_)));
    assert!(speech.spoken()[0].starts_with("Script error"));
    assert_eq!(doc.caret_paragraph(), Some(0));
}

#[test]
fn test_script_contract_violation_is_an_error() {
    let doc = sections();
    let rules = config(vec![BookmarkData::new(BookmarkCategory::QuickJump, "^Section", PatternMatch::Regex)
        .with_snippet("return True")
        .build()]);
    let result = Navigator::default().quick_jump(
        &rules,
        &caret(&doc),
        &JumpRequest::forward(URL, BookmarkCategory::QuickJump),
    );
    match result {
        Err(Error::Contract(e)) => assert!(e.is_contract()),
        other => panic!("expected a contract error, got {:?}", other),
    }
}

#[test]
fn test_script_category_runs_at_caret() {
    let doc = sections();
    doc.set_caret_paragraph(2);
    let bookmark = BookmarkData::new(BookmarkCategory::Script, "", PatternMatch::Regex)
        .with_snippet("speak('hello')\nreturn t.previous")
        .with_keystroke("kb:nvda+shift+h")
        .build();
    let id = bookmark.id();
    let rules = config(vec![bookmark]);
    let (navigator, _, speech) = recording(NavigationOptions::default());

    let outcome = navigator
        .perform(&rules, URL, &caret(&doc), Action::Bookmark(id))
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(1));
    assert_eq!(speech.spoken()[0], "hello");
}

#[test]
fn test_generator_script_becomes_task() {
    let doc = sections();
    let rules = config(vec![BookmarkData::new(BookmarkCategory::Script, "", PatternMatch::Regex)
        .with_snippet("speak('tick')\nyield 5\nspeak('tock')")
        .build()]);
    let navigator = Navigator::default();
    let outcome = navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::Script))
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Task(_)));
}

#[test]
fn test_blocked_keys_reject_commands() {
    let doc = sections();
    let keys = Arc::new(KeyBlocker::new());
    let audio = Arc::new(RecordingAudio::new());
    let navigator = Navigator::new(
        NavigationOptions::default(),
        audio.clone(),
        Arc::new(RecordingSpeech::new()),
    )
    .with_key_blocker(keys.clone());

    keys.block(std::time::Duration::from_secs(60), audio.as_ref()).unwrap();
    let outcome = navigator
        .perform(&Config::default(), URL, &caret(&doc), Action::NextSibling)
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::KeysBlocked));

    keys.unblock(audio.as_ref());
    let outcome = navigator
        .perform(&Config::default(), URL, &caret(&doc), Action::NextSibling)
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Moved { .. }));
}

#[test]
fn test_element_jumps_cover_role_groups() {
    let doc = TextDocument::new(vec![
        TextBlock::new("Intro"),
        TextBlock::new("File").with_control(ControlField::new(Role::MenuBar)),
        TextBlock::new("Read more").with_control(ControlField::new(Role::Link).with_state(ElementState::Visited)),
        TextBlock::new("Inbox").with_control(ControlField::new(Role::TreeView)),
    ]);
    let (navigator, _, speech) = recording(NavigationOptions::default());
    let rules = Config::default();

    let outcome = navigator
        .perform(&rules, URL, &caret(&doc), Action::Element(ElementKind::Menu, Direction::Forward))
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(1));
    assert_eq!(doc.caret_paragraph(), Some(1));

    let outcome = navigator
        .jump_to_element(&caret(&doc), ElementKind::TreeView, Direction::Forward)
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(3));

    let outcome = navigator
        .jump_to_element(&caret(&doc), ElementKind::VisitedLink, Direction::Backward)
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(2));

    let outcome = navigator
        .jump_to_element(&caret(&doc), ElementKind::ToolBar, Direction::Forward)
        .unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
    assert_eq!(speech.spoken().last().map(String::as_str), Some("No next tool bar"));
}

#[test]
fn test_format_change_skips_same_format() {
    let bold = FormatField::new().with("bold", "true");
    let doc = TextDocument::new(vec![
        TextBlock::new("plain one"),
        TextBlock::new("plain two"),
        TextBlock::new(""),
        TextBlock::new("Loud").with_format(bold.clone()),
        TextBlock::new("Also loud").with_format(bold),
        TextBlock::new("quiet"),
    ]);
    let (navigator, _, speech) = recording(NavigationOptions::default());

    let outcome = navigator.format_change(&caret(&doc), Direction::Forward).unwrap();
    assert_eq!(index(&doc, &outcome), Some(3));
    let outcome = navigator
        .perform(&Config::default(), URL, &caret(&doc), Action::FormatChange(Direction::Forward))
        .unwrap();
    assert_eq!(index(&doc, &outcome), Some(5));
    let outcome = navigator.format_change(&caret(&doc), Direction::Backward).unwrap();
    assert_eq!(index(&doc, &outcome), Some(4));

    doc.set_caret_paragraph(5);
    let outcome = navigator.format_change(&caret(&doc), Direction::Forward).unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
    assert_eq!(speech.spoken().last().map(String::as_str), Some("No next format change"));
}

#[test]
fn test_go_back_retraces_jumps() {
    let doc = sections();
    let rules = config(vec![section_rule()]);
    let (navigator, _, speech) = recording(NavigationOptions::default());

    navigator.perform(&rules, URL, &caret(&doc), Action::GoBack).unwrap();
    assert_eq!(speech.take(), vec!["No cursor history available".to_string()]);

    let request = JumpRequest::forward(URL, BookmarkCategory::QuickJump);
    navigator.quick_jump(&rules, &caret(&doc), &request).unwrap();
    navigator.quick_jump(&rules, &caret(&doc), &request).unwrap();
    assert_eq!(doc.caret_paragraph(), Some(4));
    assert_eq!(navigator.history_len(), 3);

    let outcome = navigator.perform(&rules, URL, &caret(&doc), Action::GoBack).unwrap();
    assert_eq!(index(&doc, &outcome), Some(1));
    assert_eq!(doc.caret_paragraph(), Some(1));
    let outcome = navigator.go_back(&caret(&doc)).unwrap();
    assert_eq!(index(&doc, &outcome), Some(0));

    speech.take();
    let outcome = navigator.go_back(&caret(&doc)).unwrap();
    assert!(matches!(outcome, JumpOutcome::Exhausted));
    assert_eq!(speech.spoken(), vec!["Cannot go back any more".to_string()]);
}

#[test]
fn test_quick_speak_leaves_no_history() {
    let doc = sections();
    let rules = config(vec![
        BookmarkData::new(BookmarkCategory::QuickSpeak, "^Section", PatternMatch::Regex).build(),
    ]);
    let navigator = Navigator::default();
    navigator
        .quick_jump(&rules, &caret(&doc), &JumpRequest::forward(URL, BookmarkCategory::QuickSpeak))
        .unwrap();
    assert_eq!(navigator.history_len(), 0);
}
