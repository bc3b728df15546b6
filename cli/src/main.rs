//! quickjump CLI - exercise QuickJump rules against text documents

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use quickjump::document::{Direction, Paragraph, TextDocument};
use quickjump::engine::{HierarchyRequest, JumpOutcome, JumpRequest, NavigationOptions, Navigator, Relation};
use quickjump::feedback::{AudioFeedback, Silent, Speech};
use quickjump::keys::Keymap;
use quickjump::model::{BookmarkCategory, Config};
use quickjump::script::{Invocation, Scheduler, Script, ScriptCall};
use quickjump::{load_rules, open_document, BrowseMode};

#[derive(Parser)]
#[command(name = "quickjump")]
#[command(version)]
#[command(about = "Run QuickJump navigation rules against text documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the navigation commands.
#[derive(clap::Args)]
struct Navigation {
    /// Document: plain text (one paragraph per line) or JSON blocks
    #[arg(value_name = "DOC")]
    document: PathBuf,

    /// Rules file
    #[arg(short, long, value_name = "FILE", env = "QUICKJUMP_RULES")]
    rules: Option<PathBuf>,

    /// URL of the document, used to select sites
    #[arg(short, long, default_value = "")]
    url: String,

    /// Paragraph index to start from
    #[arg(long, default_value = "0")]
    from: usize,

    /// Scan backwards
    #[arg(short, long)]
    backward: bool,

    /// Print sounds as they would be played
    #[arg(long)]
    sounds: bool,
}

impl Navigation {
    fn direction(&self) -> Direction {
        if self.backward {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Jump between paragraphs matched by a bookmark category
    Jump {
        #[command(flatten)]
        nav: Navigation,

        /// Bookmark category (QuickJump, QuickClick2, Hierarchical, ...)
        #[arg(short, long, default_value = "QuickJump", value_parser = parse_category)]
        category: BookmarkCategory,

        /// Number of jumps
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Move paragraph by paragraph, skipping clutter
    Move {
        #[command(flatten)]
        nav: Navigation,

        /// Number of moves
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Move to siblings, parents or children
    Browse {
        #[command(flatten)]
        nav: Navigation,

        /// Relation to the current paragraph
        #[arg(long, value_enum, default_value = "sibling")]
        relation: RelationArg,

        /// What to compare
        #[arg(long, value_enum, default_value = "offset")]
        mode: ModeArg,
    },

    /// Show hierarchical levels, or jump to one
    Levels {
        #[command(flatten)]
        nav: Navigation,

        /// Jump to this level (1-based) instead of listing levels
        #[arg(long)]
        level: Option<usize>,

        /// Continue past shallower paragraphs
        #[arg(long)]
        unbounded: bool,
    },

    /// Validate a rules file
    Check {
        /// Rules file
        #[arg(value_name = "FILE")]
        rules: PathBuf,

        /// Print every bookmark
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run a script at a paragraph
    Eval {
        /// Document to run against
        #[arg(value_name = "DOC")]
        document: PathBuf,

        /// Script source, or @FILE
        #[arg(short, long)]
        script: String,

        /// Paragraph index the script sees as `p`
        #[arg(long, default_value = "0")]
        at: usize,
    },

    /// Show version information
    Version,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum RelationArg {
    Sibling,
    Parent,
    Child,
}

impl From<RelationArg> for Relation {
    fn from(relation: RelationArg) -> Self {
        match relation {
            RelationArg::Sibling => Relation::Sibling,
            RelationArg::Parent => Relation::Parent,
            RelationArg::Child => Relation::Child,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Horizontal offset
    Offset,
    /// Font size
    Font,
    /// Font size and style
    Style,
}

impl From<ModeArg> for BrowseMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Offset => BrowseMode::HorizontalOffset,
            ModeArg::Font => BrowseMode::FontSize,
            ModeArg::Style => BrowseMode::FontSizeAndStyle,
        }
    }
}

fn parse_category(s: &str) -> Result<BookmarkCategory, quickjump::Error> {
    s.parse()
}

/// Prints what a screen reader would say.
struct ConsoleSpeech;

impl Speech for ConsoleSpeech {
    fn speak(&self, text: &str) {
        println!("  {} {}", "»".cyan(), text);
    }
}

/// Prints sounds instead of playing them.
struct ConsoleAudio;

impl AudioFeedback for ConsoleAudio {
    fn beep(&self, frequency: f64, duration_ms: u64, left: u8, right: u8) {
        println!("  {}", format!("♪ beep {:.0} Hz {} ms ({}/{})", frequency, duration_ms, left, right).dimmed());
    }

    fn crackle(&self, distance: usize, volume: u8) {
        println!("  {}", format!("♪ crackle x{} at {}%", quickjump::feedback::crackle_beeps(distance), volume).dimmed());
    }

    fn chime(&self, name: &str, volume: u8) {
        println!("  {}", format!("♪ chime '{}' at {}%", name, volume).dimmed());
    }

    fn chord(&self, chord: &str, duration_ms: u64, left: u8, right: u8) {
        println!("  {}", format!("♪ chord {} {} ms ({}/{})", chord, duration_ms, left, right).dimmed());
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Jump { nav, category, count } => cmd_jump(&nav, category, count),
        Commands::Move { nav, count } => cmd_move(&nav, count),
        Commands::Browse { nav, relation, mode } => cmd_browse(&nav, relation.into(), mode.into()),
        Commands::Levels { nav, level, unbounded } => cmd_levels(&nav, level, unbounded),
        Commands::Check { rules, verbose } => cmd_check(&rules, verbose),
        Commands::Eval { document, script, at } => cmd_eval(&document, &script, at),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Document, rules and navigator for a navigation command.
struct Session {
    doc: Arc<TextDocument>,
    rules: Config,
    navigator: Navigator,
}

impl Session {
    fn open(nav: &Navigation, options: NavigationOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let doc = open_document(&nav.document)?;
        if nav.from >= doc.paragraph_count().max(1) {
            return Err(format!("--from {} is past the last paragraph", nav.from).into());
        }
        doc.set_caret_paragraph(nav.from);
        let rules = match &nav.rules {
            Some(path) => load_rules(path)?,
            None => Config::default(),
        };
        let audio: Arc<dyn AudioFeedback> = if nav.sounds {
            Arc::new(ConsoleAudio)
        } else {
            Arc::new(Silent)
        };
        let navigator = Navigator::new(options, audio, Arc::new(ConsoleSpeech));
        Ok(Self { doc, rules, navigator })
    }

    fn caret(&self) -> Paragraph {
        Paragraph::new(self.doc.caret())
    }

    /// Print an outcome; returns whether the caret can keep going.
    fn report(&self, outcome: &JumpOutcome) -> bool {
        let index = |p: &Paragraph| {
            self.doc
                .paragraph_index(p)
                .map_or_else(|| "?".to_string(), |i| i.to_string())
        };
        match outcome {
            JumpOutcome::Matched(jump) | JumpOutcome::Announced(jump) | JumpOutcome::Clicked(jump) => {
                let level = jump
                    .level
                    .map(|l| format!(" level {}", l + 1))
                    .unwrap_or_default();
                println!(
                    "{} #{} via '{}' ({} paragraphs{})",
                    "→".green().bold(),
                    index(&jump.target),
                    jump.bookmark.display_name(),
                    jump.distance,
                    level
                );
                true
            }
            JumpOutcome::Moved { target, distance } => {
                println!("{} #{} ({} paragraphs)", "→".green().bold(), index(target), distance);
                true
            }
            JumpOutcome::ScriptFailed(e) => {
                println!("{} {}", "Script failed:".red(), e);
                false
            }
            JumpOutcome::Task(_) => {
                println!("{}", "Script started a background task".yellow());
                false
            }
            other => {
                println!("{} {:?}", "■".yellow(), other);
                false
            }
        }
    }
}

fn cmd_jump(nav: &Navigation, category: BookmarkCategory, count: usize) -> CliResult {
    let session = Session::open(nav, NavigationOptions::default())?;
    for _ in 0..count {
        let request = JumpRequest::new(&nav.url, category, nav.direction());
        let outcome = session.navigator.quick_jump(&session.rules, &session.caret(), &request)?;
        if let JumpOutcome::Task(task) = outcome {
            run_task(&session.navigator, task);
            break;
        }
        if !session.report(&outcome) {
            break;
        }
    }
    Ok(())
}

fn cmd_move(nav: &Navigation, count: usize) -> CliResult {
    let session = Session::open(nav, NavigationOptions::default())?;
    for _ in 0..count {
        let outcome = session
            .navigator
            .move_paragraph(&session.rules, &nav.url, &session.caret(), nav.direction())?;
        if !session.report(&outcome) {
            break;
        }
    }
    Ok(())
}

fn cmd_browse(nav: &Navigation, relation: Relation, mode: BrowseMode) -> CliResult {
    let options = NavigationOptions::default().with_browse_mode(mode);
    let session = Session::open(nav, options)?;
    let outcome = session.navigator.browse(&session.caret(), relation, nav.direction())?;
    session.report(&outcome);
    Ok(())
}

fn cmd_levels(nav: &Navigation, level: Option<usize>, unbounded: bool) -> CliResult {
    let session = Session::open(nav, NavigationOptions::default())?;

    if let Some(level) = level {
        let level = level.checked_sub(1).ok_or("levels start at 1")?;
        let mut request = HierarchyRequest::new(&nav.url, Some(level), nav.direction());
        if unbounded {
            request = request.unbounded();
        }
        let outcome = session
            .navigator
            .hierarchical_jump(&session.rules, &session.caret(), &request)?;
        session.report(&outcome);
        return Ok(());
    }

    let bookmarks = session
        .rules
        .applicable_bookmarks(&nav.url, BookmarkCategory::Hierarchical);
    if bookmarks.is_empty() {
        println!("{}", "No hierarchical bookmarks apply to this URL".yellow());
        return Ok(());
    }
    let caret = session.caret();
    let levels = session.navigator.levels_for(&session.rules, &caret, &bookmarks)?;

    println!("{}", "Levels".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for (rank, offset) in levels.offsets().iter().enumerate() {
        println!("{}: offset {}", format!("Level {}", rank + 1).bold(), offset);
    }
    println!();
    let matched = quickjump::engine::levels::matched_paragraphs(&bookmarks, &caret, session.navigator.matcher());
    for paragraph in matched {
        let rank = paragraph
            .horizontal_offset()
            .and_then(|x| levels.rank(x))
            .map_or_else(|| "?".to_string(), |r| (r + 1).to_string());
        let indent = "  ".repeat(rank.parse::<usize>().map_or(0, |r| r - 1));
        println!("{}{} {}", indent, format!("[{}]", rank).dimmed(), paragraph.text().trim());
    }
    Ok(())
}

fn cmd_check(path: &Path, verbose: bool) -> CliResult {
    let rules = load_rules(path)?;

    println!("{}", "Rules".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let mut problems = 0;
    for site in rules.sites() {
        println!(
            "{}: {} ({:?}, {} bookmarks)",
            "Site".bold(),
            site.display_name(),
            site.url_match,
            site.bookmarks.len()
        );
        for bookmark in &site.bookmarks {
            if let Some(e) = bookmark.compile_error() {
                problems += 1;
                println!("  {} {}: {}", "✗".red(), bookmark.display_name(), e);
            } else if verbose {
                let state = if bookmark.enabled { "" } else { " (disabled)" };
                println!(
                    "  {} {} [{}]{}",
                    "✓".green(),
                    bookmark.display_name(),
                    bookmark.category.name(),
                    state
                );
            }
        }

        let url = format!("https://{}/", site.domain);
        let mut keymap = Keymap::with_defaults()?;
        for e in keymap.bind_bookmarks(&rules, &url) {
            problems += 1;
            println!("  {} {}", "✗".red(), e);
        }
    }

    println!();
    if problems == 0 {
        println!("{}", "No problems found".green().bold());
        Ok(())
    } else {
        Err(format!("{} problems found", problems).into())
    }
}

fn cmd_eval(document: &Path, script: &str, at: usize) -> CliResult {
    let source = match script.strip_prefix('@') {
        Some(file) => fs::read_to_string(file)?,
        None => script.to_string(),
    };
    let doc = open_document(document)?;
    let script = Script::compile(&source)?;
    let paragraph = Paragraph::new(doc.cursor_at(at));
    let navigator = Navigator::new(NavigationOptions::default(), Arc::new(ConsoleAudio), Arc::new(ConsoleSpeech));

    match script.invoke(ScriptCall::new(paragraph.clone(), paragraph))? {
        Invocation::Finished { result, effects } => {
            navigator.dispatch_effects(effects);
            match result {
                Some(args) => {
                    println!("{} {:?}", "match".green().bold(), args.offset);
                    if let Some(message) = args.message.text() {
                        println!("  message: {}", message);
                    }
                }
                None => println!("{}", "no match".yellow()),
            }
        }
        Invocation::Task(task) => run_task(&navigator, task),
    }
    let activations = doc.activations();
    if !activations.is_empty() {
        println!("{} {:?}", "clicked".bold(), activations);
    }
    Ok(())
}

fn run_task(navigator: &Navigator, task: quickjump::script::ScriptTask) {
    let mut scheduler = Scheduler::new();
    scheduler.spawn(task);
    for (_, result) in scheduler.run_blocking(|_, effects| navigator.dispatch_effects(effects)) {
        if let Err(e) = result {
            println!("{} {}", "Task failed:".red(), e);
        }
    }
}

fn cmd_version() {
    println!("{} {}", "quickjump".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Rule-driven paragraph navigation");
    println!();
    println!("License: MIT");
}
