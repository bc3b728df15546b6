//! Integration tests for rule scripts.

use std::sync::Arc;

use quickjump::document::{Paragraph, TextBlock, TextDocument};
use quickjump::script::{
    Invocation, MatchArgs, MatchMessage, MatchOffset, Scheduler, Script, ScriptCall, ScriptEffect, ScriptErrorKind,
};

fn doc() -> Arc<TextDocument> {
    TextDocument::new(vec![
        TextBlock::new("Price"),
        TextBlock::new("12.50 EUR"),
        TextBlock::new("Stock"),
        TextBlock::new("3 left"),
    ])
}

fn invoke(source: &str) -> (Option<MatchArgs>, Vec<ScriptEffect>) {
    let doc = doc();
    let p = Paragraph::new(doc.cursor_at(0));
    let script = Script::compile(source).unwrap();
    match script.invoke(ScriptCall::new(p.clone(), p)).unwrap() {
        Invocation::Finished { result, effects } => (result, effects),
        Invocation::Task(_) => panic!("unexpected generator"),
    }
}

#[test]
fn test_unsafe_builtins_do_not_compile() {
    for source in [
        "open('/etc/passwd')",
        "__import__('os')",
        "x = eval('1')",
        "import os",
    ] {
        assert!(Script::compile(source).is_err(), "{} compiled", source);
    }
}

#[test]
fn test_match_variants_agree() {
    let call = invoke("match(2, 'hi')").0.unwrap();
    let tuple = invoke("return (2, 'hi')").0.unwrap();
    let dict = invoke("return {'offset': 2, 'message': 'hi'}").0.unwrap();
    let keywords = invoke("match(offset=2, message='hi')").0.unwrap();

    let expected = MatchArgs {
        offset: MatchOffset::Paragraphs(2),
        message: MatchMessage::Text("hi".into()),
    };
    for args in [call, tuple, dict, keywords] {
        assert_eq!(args, expected);
    }
}

#[test]
fn test_scripts_read_paragraphs() {
    let source = "\
price = p.next.text.split()[0]
if float(price) > 10:
    return (p.next, 'expensive: ' + price)
";
    let (result, _) = invoke(source);
    let args = result.unwrap();
    assert_eq!(args.message.text().as_deref(), Some("expensive: 12.50"));
    match args.offset {
        MatchOffset::Paragraph(target) => assert_eq!(target.text(), "12.50 EUR"),
        other => panic!("unexpected offset {:?}", other),
    }
}

#[test]
fn test_effects_are_collected() {
    let (result, effects) = invoke("speak('checking')\nbeep(440, 30)\nclick(p.next)");
    assert!(result.is_none());
    assert_eq!(effects.len(), 3);
    assert!(matches!(&effects[0], ScriptEffect::Speak(s) if s == "checking"));
    assert!(matches!(effects[1], ScriptEffect::Beep { duration_ms: 30, .. }));
    assert!(matches!(&effects[2], ScriptEffect::Click(p) if p.text() == "12.50 EUR"));
}

#[test]
fn test_not_found_is_no_match() {
    let (result, _) = invoke("return p.previous");
    assert!(result.is_none());
}

#[test]
fn test_runaway_script_is_stopped() {
    let doc = doc();
    let p = Paragraph::new(doc.cursor_at(0));
    let script = Script::compile("while True:\n    pass").unwrap();
    let err = script
        .invoke(ScriptCall::new(p.clone(), p).with_step_limit(1_000))
        .unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::StepLimit);
}

#[test]
fn test_generator_runs_on_scheduler() {
    let doc = doc();
    let p = Paragraph::new(doc.cursor_at(0));
    let script = Script::compile("for i in range(3):\n    speak(str(i))\n    yield 1").unwrap();
    assert!(script.is_generator());

    let Invocation::Task(task) = script.invoke(ScriptCall::new(p.clone(), p)).unwrap() else {
        panic!("expected a task");
    };
    let mut scheduler = Scheduler::new();
    scheduler.spawn(task);
    let mut spoken = Vec::new();
    let finished = scheduler.run_blocking(|_, effects| {
        for effect in effects {
            if let ScriptEffect::Speak(text) = effect {
                spoken.push(text);
            }
        }
    });
    assert_eq!(spoken, vec!["0", "1", "2"]);
    assert_eq!(finished.len(), 1);
    assert!(finished[0].1.is_ok());
    assert!(scheduler.is_empty());
}

#[test]
fn test_index_targets_and_repetition() {
    let source = "\
counts = [0] * 3
for i in range(5):
    counts[i % 3] += 1
pairs = [[0, 0] for _ in range(2)]
pairs[1][0] = 7
if counts == [2, 2, 1] and pairs[1] == [7, 0] and 5 not in range(-9223372036854775807 - 1, 9223372036854775807, 3):
    match(1)";
    let args = invoke(source).0.unwrap();
    assert_eq!(args.offset, MatchOffset::Paragraphs(1));
}
