//! Benchmarks for matching and navigation.
//!
//! Run with: cargo bench
//!
//! These benchmarks use synthetic documents and rule sets.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use quickjump::document::{Paragraph, TextDocument};
use quickjump::engine::{JumpRequest, NavigationOptions, Navigator};
use quickjump::matcher::CompositeMatcher;
use quickjump::model::{BookmarkCategory, BookmarkData, Config, PatternMatch, Site, UrlMatch};
use quickjump::script::{Script, ScriptCall};

/// A long outline: numbered sections with indented items.
fn create_test_document(sections: usize) -> String {
    let mut text = String::new();
    for i in 0..sections {
        text.push_str(&format!("Section {}\n", i + 1));
        for j in 0..8 {
            text.push_str(&format!("  item {} of section {}: some filler text\n", j, i + 1));
        }
    }
    text.push_str("Footer");
    text
}

fn create_rules(count: usize) -> Config {
    let mut bookmarks: Vec<_> = (0..count)
        .map(|i| BookmarkData::new(BookmarkCategory::QuickJump, format!("keyword{}", i), PatternMatch::Substring).build())
        .collect();
    bookmarks.push(BookmarkData::new(BookmarkCategory::QuickJump, "^Footer$", PatternMatch::Regex).build());
    Config::new(vec![Site::new("", UrlMatch::Ignore).with_bookmarks(bookmarks)])
}

/// Benchmark the composite matcher against many bookmarks.
fn bench_composite_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite_matching");

    for count in [1, 10, 100].iter() {
        let rules = create_rules(*count);
        let bookmarks = rules.applicable_bookmarks("", BookmarkCategory::QuickJump);
        let matcher = CompositeMatcher::new();

        group.bench_function(format!("{}_bookmarks", count), |b| {
            b.iter(|| matcher.find_matches(black_box(&bookmarks), black_box("item 3 of section 7: keyword5 here")));
        });
    }

    group.finish();
}

/// Benchmark a full jump across a long document.
fn bench_quick_jump(c: &mut Criterion) {
    let doc = TextDocument::from_plain_text(&create_test_document(200));
    let rules = create_rules(50);
    let navigator = Navigator::silent(NavigationOptions::default());
    let request = JumpRequest::forward("", BookmarkCategory::QuickJump);

    c.bench_function("jump_to_footer", |b| {
        b.iter(|| {
            doc.set_caret_paragraph(0);
            let caret = Paragraph::new(doc.caret());
            navigator.quick_jump(black_box(&rules), &caret, &request).unwrap()
        });
    });
}

/// Benchmark script compilation and a short run.
fn bench_scripts(c: &mut Criterion) {
    let source = "n = 0\nfor q in [p.next, p.next.next]:\n    if 'item' in q.text:\n        n += 1\nif n == 2:\n    match(1)";
    let doc = TextDocument::from_plain_text(&create_test_document(2));
    let p = Paragraph::new(doc.cursor_at(0));

    c.bench_function("script_compile", |b| {
        b.iter(|| Script::compile(black_box(source)).unwrap());
    });

    let script = Script::compile(source).unwrap();
    c.bench_function("script_invoke", |b| {
        b.iter(|| script.invoke(ScriptCall::new(p.clone(), p.clone())).unwrap());
    });
}

criterion_group!(benches, bench_composite_matching, bench_quick_jump, bench_scripts,);
criterion_main!(benches);
