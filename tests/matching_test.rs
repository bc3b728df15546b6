//! Integration tests for bookmark matching and attribute filters.

use std::sync::Arc;

use quickjump::document::{ControlField, FormatField, Paragraph, TextBlock, TextDocument};
use quickjump::matcher::CompositeMatcher;
use quickjump::model::{
    matches_all, Attribute, AttributeMatch, AttributeSet, Bookmark, BookmarkCategory, BookmarkData, PatternMatch,
    Role,
};

fn bookmark(pattern: &str, pattern_match: PatternMatch) -> Arc<Bookmark> {
    BookmarkData::new(BookmarkCategory::QuickJump, pattern, pattern_match).build()
}

#[test]
fn test_each_bookmark_matches_independently() {
    let short = bookmark("ab", PatternMatch::Substring);
    let long = bookmark("abc", PatternMatch::Substring);
    let matches = CompositeMatcher::new().find_matches(&[short.clone(), long.clone()], "xxabcxx");

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].bookmark.id(), short.id());
    assert_eq!((matches[0].start, matches[0].end), (2, 4));
    assert_eq!(matches[1].bookmark.id(), long.id());
    assert_eq!((matches[1].start, matches[1].end), (2, 5));
}

#[test]
fn test_identical_bookmarks_are_distinct() {
    let a = bookmark("news", PatternMatch::Substring);
    let b = bookmark("news", PatternMatch::Substring);
    assert_eq!(*a, *b);
    assert_ne!(a.id(), b.id());

    let matches = CompositeMatcher::new().find_matches(&[a.clone(), b.clone()], "latest news");
    let ids: Vec<_> = matches.iter().map(|m| m.bookmark.id()).collect();
    assert_eq!(ids, vec![a.id(), b.id()]);
}

#[test]
fn test_mixed_pattern_kinds() {
    let exact = bookmark("Sign in", PatternMatch::Exact);
    let regex = bookmark(r"\d+ comments?", PatternMatch::Regex);
    let literal = bookmark("a+b", PatternMatch::Substring);
    let all = [exact.clone(), regex.clone(), literal.clone()];
    let matcher = CompositeMatcher::new();

    assert_eq!(matcher.find_matches(&all, "Sign in").len(), 1);
    assert!(matcher.find_matches(&all, "Sign in here").is_empty());
    let found = matcher.first_match(&all, "12 comments").unwrap();
    assert_eq!(found.bookmark.id(), regex.id());
    assert_eq!(found.text, "12 comments");
    assert_eq!(matcher.first_match(&all, "x = a+b").unwrap().bookmark.id(), literal.id());
    assert!(matcher.first_match(&all, "aab").is_none());
}

#[test]
fn test_filters_and_inversion() {
    let filters: Vec<AttributeMatch> = ["role:link", "!role:button"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

    let link_heading: AttributeSet = [Attribute::Role(Role::Link), Attribute::Heading(2)]
        .into_iter()
        .collect();
    assert!(matches_all(&filters, &link_heading));

    let link_button: AttributeSet = [Attribute::Role(Role::Link), Attribute::Role(Role::Button)]
        .into_iter()
        .collect();
    assert!(!matches_all(&filters, &link_button));

    assert!(matches_all(&[], &link_button));
}

#[test]
fn test_paragraph_attributes_feed_filters() {
    let doc = TextDocument::new(vec![
        TextBlock::new("Results")
            .with_control(ControlField::heading(2))
            .with_format(FormatField::new().with("bold", "true")),
        TextBlock::new("More")
            .with_control(ControlField::new(Role::Link))
            .with_control(ControlField::new(Role::Button)),
    ]);
    let heading = Paragraph::new(doc.cursor_at(0));
    let more = Paragraph::new(doc.cursor_at(1));

    let filter = |s: &str| -> Vec<AttributeMatch> { vec![s.parse().unwrap()] };
    assert!(heading.matches_filters(&filter("heading:2")));
    assert!(heading.matches_filters(&filter("bold:true")));
    assert!(!heading.matches_filters(&filter("role:link")));
    assert!(more.matches_filters(&filter("role:link")));
    assert!(!more.matches_filters(&filter("!role:button")));
}
