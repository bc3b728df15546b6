//! Turning a matched bookmark into a target paragraph.

use crate::document::Paragraph;
use crate::model::Bookmark;
use crate::script::{Invocation, MatchOffset, ScriptCall, ScriptEffect, ScriptError, ScriptTask};

/// Where a match leads.
#[derive(Debug)]
pub(crate) enum Resolution {
    Target {
        target: Paragraph,
        message: Option<String>,
    },
    /// The bookmark declined this paragraph
    NoMatch,
    /// The bookmark's script is a generator
    Task(ScriptTask),
}

/// Context handed to a bookmark's script.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolveContext {
    pub level: Option<i64>,
    pub modifiers: i64,
    pub step_limit: u64,
}

/// Resolve `bookmark` matched at `candidate` during a scan from `origin`.
///
/// Returns the resolution and the side effects the script requested.
pub(crate) fn resolve(
    bookmark: &Bookmark,
    candidate: &Paragraph,
    origin: &Paragraph,
    context: ResolveContext,
) -> Result<(Resolution, Vec<ScriptEffect>), ScriptError> {
    let static_message = Some(bookmark.message.clone()).filter(|m| !m.is_empty());

    if !bookmark.has_script() {
        let resolution = match candidate.move_by(bookmark.offset) {
            Ok(target) => Resolution::Target {
                target,
                message: static_message,
            },
            Err(_) => Resolution::NoMatch,
        };
        return Ok((resolution, Vec::new()));
    }

    if bookmark.offset != 0 {
        return Err(ScriptError::new(format!(
            "bookmark '{}' has a script, so its offset must be 0",
            bookmark.display_name()
        )));
    }
    let Some(script) = bookmark.script() else {
        let reason = bookmark
            .compile_error()
            .map(|e| e.to_string())
            .unwrap_or_default();
        return Err(ScriptError::new(format!(
            "bookmark '{}' script does not compile: {}",
            bookmark.display_name(),
            reason
        )));
    };

    let call = ScriptCall::new(candidate.clone(), origin.clone())
        .with_level(context.level)
        .with_modifiers(context.modifiers)
        .with_step_limit(context.step_limit);
    match script.invoke(call)? {
        // Generators only compile for Script and NumericScript bookmarks.
        Invocation::Task(task) => Ok((Resolution::Task(task), Vec::new())),
        Invocation::Finished { result: None, effects } => Ok((Resolution::NoMatch, effects)),
        Invocation::Finished {
            result: Some(args),
            effects,
        } => {
            if !args.message.is_none() && static_message.is_some() {
                return Err(ScriptError::new(format!(
                    "bookmark '{}' defines a message, so its script cannot supply one",
                    bookmark.display_name()
                )));
            }
            let message = static_message.or_else(|| args.message.text());
            let target = match args.offset {
                MatchOffset::Here => Some(candidate.clone()),
                MatchOffset::Paragraphs(n) => candidate.move_by(n).ok(),
                MatchOffset::Paragraph(p) => Some(p),
            };
            let resolution = match target {
                Some(target) => Resolution::Target { target, message },
                None => Resolution::NoMatch,
            };
            Ok((resolution, effects))
        }
    }
}
