//! Integration tests for paragraph movement.

use quickjump::document::{Boundary, Direction, ElementKind, Paragraph, TextDocument};
use quickjump::error::Error;

fn article() -> std::sync::Arc<TextDocument> {
    TextDocument::from_plain_text("# Title\nFirst paragraph\n  quoted\nSecond paragraph\n## Next\nLast")
}

#[test]
fn test_next_previous_symmetry() {
    let doc = article();
    for i in 1..doc.paragraph_count() - 1 {
        let p = Paragraph::new(doc.cursor_at(i));
        let there_and_back = p.next().unwrap().previous().unwrap();
        assert!(there_and_back.same_position(&p), "next.previous at {}", i);
        let back_and_there = p.previous().unwrap().next().unwrap();
        assert!(back_and_there.same_position(&p), "previous.next at {}", i);
    }
}

#[test]
fn test_boundaries_are_final() {
    let doc = article();
    for i in 0..doc.paragraph_count() {
        let p = Paragraph::new(doc.cursor_at(i));
        assert_eq!(p.home().boundary(), Boundary::Home);
        assert!(matches!(p.home().previous(), Err(Error::NotFound)));
        assert!(matches!(p.end().next(), Err(Error::NotFound)));
    }
}

#[test]
fn test_home_and_end_step_into_document() {
    let doc = article();
    let p = Paragraph::new(doc.cursor_at(2));
    assert_eq!(p.home().next().unwrap().text(), "# Title");
    assert_eq!(p.end().previous().unwrap().text(), "Last");
}

#[test]
fn test_walk_visits_every_paragraph_once() {
    let doc = article();
    let first = Paragraph::new(doc.cursor_at(0));
    let forward: Vec<String> = first.home().walk(Direction::Forward).map(|p| p.text()).collect();
    assert_eq!(forward.len(), doc.paragraph_count());

    let mut backward: Vec<String> = first.end().walk(Direction::Backward).map(|p| p.text()).collect();
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn test_move_by_counts() {
    let doc = article();
    let p = Paragraph::new(doc.cursor_at(1));
    assert_eq!(p.move_by(3).unwrap().text(), "## Next");
    assert_eq!(p.move_by(-1).unwrap().text(), "# Title");
    assert!(p.move_by(-2).is_err());
    assert!(p.move_by(0).unwrap().same_position(&p));
}

#[test]
fn test_find_heading() {
    let doc = article();
    let p = Paragraph::new(doc.cursor_at(1));
    let heading = p.find_element(ElementKind::Heading(None), Direction::Forward).unwrap();
    assert_eq!(heading.heading_level(), Some(2));
    assert!(p.find_element(ElementKind::Heading(None), Direction::Backward).is_ok());
    assert!(heading.find_element(ElementKind::Heading(None), Direction::Forward).is_err());
}

#[test]
fn test_offsets_follow_indentation() {
    let doc = article();
    let outer = Paragraph::new(doc.cursor_at(1)).horizontal_offset().unwrap();
    let inner = Paragraph::new(doc.cursor_at(2)).horizontal_offset().unwrap();
    assert!(inner > outer);
}
