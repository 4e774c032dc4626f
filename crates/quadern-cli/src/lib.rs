//! Command-line front end for quadern notebooks.
//!
//! Every invocation loads the notebook from the data directory, runs one
//! command and saves when the command changed something.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use quadern_core::{
    activity, content_preview, export_json, export_markdown, format_location,
    format_relative_time, format_storage_size, parse_import, popular_tags, recent_notes, search,
    tag_usage, CourseCoordinates,
    CourseOutline, ExportOptions, FileStorage, ImportPolicy, ImportReport, Note, NoteEdit,
    NoteFilter, NoteStats, NoteStore, QuadernConfig, SectionInfo, StoreState,
};
use quadern_tags::{parse_tag_query, AutocompleteEngine, TagQuery};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "quadern", version, about = "Notes anchored to documentation sections")]
pub struct Cli {
    /// Config file (TOML, or JSON with a .json extension)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the notebook; overrides storage.data_dir
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a note for a section
    Add(AddArgs),
    /// List notes, optionally of one page or one section
    List {
        #[arg(long)]
        page: Option<String>,
        #[arg(long, requires = "page")]
        section: Option<String>,
    },
    /// Print a note as JSON
    Show { id: String },
    /// Change a note's title, tags or content
    Edit {
        id: String,
        #[command(flatten)]
        fields: EditFields,
    },
    /// Delete a note
    Rm { id: String },
    /// Copy a note into the same section
    Dup { id: String },
    /// Search notes by text, tags and location
    Search(SearchArgs),
    /// Dashboard statistics and recent notes
    Stats,
    /// Notes grouped by unit, bloc and section
    Outline,
    /// Tag usage, or completions for a prefix
    Tags {
        prefix: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Export the notebook as JSON or Markdown
    Export(ExportArgs),
    /// Import notes from an export, a backup or a legacy file
    Import {
        path: PathBuf,
        /// Keep existing notes and give imported duplicates a new id
        #[arg(long)]
        keep_both: bool,
    },
    /// Copy notes from the legacy storage key into the notebook
    MigrateLegacy {
        #[arg(long)]
        keep_both: bool,
    },
    /// Verify the section index
    Check,
    /// Rebuild the section index
    Repair,
}

#[derive(Debug, Args)]
pub struct EditFields {
    #[arg(long)]
    pub title: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
}

impl From<EditFields> for NoteEdit {
    fn from(fields: EditFields) -> Self {
        NoteEdit {
            title: fields.title,
            tags: fields.tags,
            content: fields.content,
        }
    }
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub page: String,
    #[arg(long)]
    pub section: String,
    /// Heading text; defaults to the section id
    #[arg(long)]
    pub section_title: Option<String>,
    #[arg(long)]
    pub unitat: Option<u32>,
    #[arg(long)]
    pub bloc: Option<u32>,
    #[command(flatten)]
    pub fields: EditFields,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    pub query: Option<String>,
    /// Tag filter: `examen`, `tags:a+b`, `tags:a|b` or `-tags:a`
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long)]
    pub unitat: Option<u32>,
    #[arg(long)]
    pub bloc: Option<u32>,
    #[arg(long)]
    pub page: Option<String>,
    /// Start from the filter saved by the web UI
    #[arg(long)]
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,
    /// Write to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub no_timestamps: bool,
    #[arg(long)]
    pub no_metadata: bool,
    /// Markdown: list notes without unit/bloc/section headings
    #[arg(long)]
    pub flat: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No note with id {0}")]
    NoteNotFound(String),

    #[error("Invalid tag filter: {0}")]
    InvalidTagQuery(String),

    #[error("No data directory; pass --data-dir or set storage.data_dir")]
    NoDataDir,

    #[error("Nothing to change; pass --title, --tags or --content")]
    EmptyEdit,

    #[error("Section index has {0} issue(s); run `quadern repair`")]
    IndexIssues(usize),
}

fn load_config(path: Option<&Path>) -> Result<QuadernConfig, Box<dyn Error>> {
    if let Some(path) = path {
        return Ok(QuadernConfig::load(path)?);
    }
    match QuadernConfig::default_path() {
        Some(path) if path.exists() => Ok(QuadernConfig::load(&path)?),
        _ => Ok(QuadernConfig::default()),
    }
}

/// Run one command, writing its output to `out`.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli.config.as_deref())?;
    let dir = cli
        .data_dir
        .or_else(|| config.resolve_data_dir())
        .ok_or(CliError::NoDataDir)?;
    let store = NoteStore::with_config(FileStorage::open(&dir)?, &config);
    let mut state = store.load();

    match cli.command {
        Command::Add(args) => {
            let section = SectionInfo {
                title: args.section_title.unwrap_or_else(|| args.section.clone()),
                id: args.section,
                page_url: args.page,
                order: 0,
            };
            let coords = CourseCoordinates {
                unitat: args.unitat,
                bloc: args.bloc,
            };
            let mut note = store.create_note_for_section(&mut state, &section, coords);
            let edit = NoteEdit::from(args.fields);
            if !edit.is_empty() {
                if let Some(edited) = store.update_note(&mut state, &note.id, &edit) {
                    note = edited;
                }
            }
            store.try_save(&mut state)?;
            info!(id = %note.id, "note created");
            writeln!(out, "{}", note.id)?;
        }

        Command::List { page, section } => {
            let notes: Vec<Note> = match (page, section) {
                (Some(page), Some(section)) => store.notes_for_section(&state, &page, &section),
                (page, _) => {
                    let filter = NoteFilter {
                        page_url: page,
                        ..NoteFilter::default()
                    };
                    search(&state, &filter).into_iter().cloned().collect()
                }
            };
            for note in &notes {
                write_note_line(out, note, config.display.preview_length)?;
            }
            writeln!(out, "{} note(s)", notes.len())?;
        }

        Command::Show { id } => {
            let note = state.notes.get(&id).ok_or(CliError::NoteNotFound(id.clone()))?;
            writeln!(out, "{}", serde_json::to_string_pretty(note)?)?;
        }

        Command::Edit { id, fields } => {
            let edit = NoteEdit::from(fields);
            if edit.is_empty() {
                return Err(CliError::EmptyEdit.into());
            }
            store
                .update_note(&mut state, &id, &edit)
                .ok_or(CliError::NoteNotFound(id.clone()))?;
            store.try_save(&mut state)?;
            writeln!(out, "updated {}", id)?;
        }

        Command::Rm { id } => {
            store
                .delete_note(&mut state, &id)
                .ok_or(CliError::NoteNotFound(id.clone()))?;
            store.try_save(&mut state)?;
            writeln!(out, "deleted {}", id)?;
        }

        Command::Dup { id } => {
            let copy = store
                .duplicate_note(&mut state, &id)
                .ok_or(CliError::NoteNotFound(id.clone()))?;
            store.try_save(&mut state)?;
            writeln!(out, "{}", copy.id)?;
        }

        Command::Search(args) => {
            let filter = build_filter(&state, args)?;
            let found = search(&state, &filter);
            for note in &found {
                write_note_line(out, note, config.display.search_preview_length)?;
            }
            writeln!(out, "{} result(s)", found.len())?;
        }

        Command::Stats => {
            let stats = NoteStats::compute(&state);
            writeln!(out, "Notes: {}", stats.total)?;
            writeln!(out, "Sections with notes: {}", stats.sections_with_notes)?;
            writeln!(out, "Tagged notes: {}", stats.tagged_notes)?;
            writeln!(out, "Distinct tags: {}", stats.distinct_tags)?;
            for (unitat, count) in &stats.by_unit {
                writeln!(out, "Unitat {}: {}", unitat, count)?;
            }
            if stats.without_unit > 0 {
                writeln!(out, "Without unit: {}", stats.without_unit)?;
            }
            writeln!(out, "Storage: {}", format_storage_size(stats.storage_bytes))?;
            if let Some(last) = stats.last_edit {
                writeln!(out, "Last edit: {}", format_relative_time(last, store.now()))?;
            }

            let popular = popular_tags(&state, config.display.popular_tags);
            if !popular.is_empty() {
                let cloud: Vec<String> =
                    popular.iter().map(|t| format!("#{} ({})", t.tag, t.count)).collect();
                writeln!(out, "Popular tags: {}", cloud.join(" "))?;
            }
            let days = activity(&state, store.now(), config.display.activity_days);
            if !days.is_empty() {
                let chart: Vec<String> =
                    days.iter().map(|d| format!("{} {}", d.label, d.count)).collect();
                writeln!(out, "Activity: {}", chart.join(" | "))?;
            }

            let recent = recent_notes(&state, config.display.max_recent_notes);
            if !recent.is_empty() {
                writeln!(out, "\nRecent:")?;
                for note in recent {
                    write_note_line(out, note, config.display.preview_length)?;
                }
            }
        }

        Command::Outline => {
            let outline = CourseOutline::build(&state);
            for unit in &outline.units {
                writeln!(out, "{}", unit.label)?;
                for bloc in &unit.blocs {
                    writeln!(out, "  {}", bloc.label)?;
                    for section in &bloc.sections {
                        writeln!(out, "    {} ({})", section.title, section.notes.len())?;
                        for note in section.notes.iter().filter_map(|id| state.notes.get(id)) {
                            writeln!(out, "      {}  {}", note.id, note.display_title())?;
                        }
                    }
                }
            }
            writeln!(out, "{} note(s)", outline.note_count())?;
        }

        Command::Tags { prefix, limit } => {
            let usage = tag_usage(&state);
            match prefix {
                Some(prefix) => {
                    let engine = AutocompleteEngine::new(usage);
                    for suggestion in engine.complete(&prefix, limit, store.now()) {
                        writeln!(out, "{}  {}", suggestion.path, suggestion.use_count)?;
                    }
                }
                None => {
                    for tag in usage.iter().take(limit) {
                        writeln!(out, "{}  {}", tag.path, tag.use_count)?;
                    }
                }
            }
        }

        Command::Export(args) => {
            let options = ExportOptions {
                include_timestamps: !args.no_timestamps,
                include_metadata: !args.no_metadata,
                group_by_structure: !args.flat,
            };
            let document = match args.format {
                ExportFormat::Json => export_json(&state, &options, store.now())?,
                ExportFormat::Markdown => export_markdown(&state, &options, store.now()),
            };
            match args.output {
                Some(path) => {
                    fs::write(&path, document)?;
                    info!(path = %path.display(), notes = state.notes.len(), "notebook exported");
                    writeln!(out, "exported {} note(s) to {}", state.notes.len(), path.display())?;
                }
                None => write!(out, "{}", document)?,
            }
        }

        Command::Import { path, keep_both } => {
            let parsed = parse_import(&fs::read_to_string(&path)?)?;
            let report = store.import_notes(&mut state, parsed, policy(keep_both));
            if report.stored() > 0 {
                store.try_save(&mut state)?;
            }
            write_report(out, &report)?;
        }

        Command::MigrateLegacy { keep_both } => {
            let parsed = store.load_legacy();
            if parsed.notes.is_empty() && parsed.skipped == 0 {
                writeln!(out, "no legacy notes under {}", store.legacy_key())?;
                return Ok(());
            }
            let report = store.import_notes(&mut state, parsed, policy(keep_both));
            if report.stored() > 0 {
                store.try_save(&mut state)?;
            }
            write_report(out, &report)?;
        }

        Command::Check => {
            let issues = store.check_index(&state);
            if issues.is_empty() {
                writeln!(out, "index ok ({} notes)", state.notes.len())?;
            } else {
                for issue in &issues {
                    writeln!(out, "{}", issue)?;
                }
                return Err(CliError::IndexIssues(issues.len()).into());
            }
        }

        Command::Repair => {
            let fixed = store.rebuild_index(&mut state);
            if fixed > 0 {
                store.try_save(&mut state)?;
            }
            writeln!(out, "fixed {} issue(s)", fixed)?;
        }
    }

    Ok(())
}

fn policy(keep_both: bool) -> ImportPolicy {
    if keep_both {
        ImportPolicy::KeepBoth
    } else {
        ImportPolicy::Overwrite
    }
}

fn build_filter(state: &StoreState, args: SearchArgs) -> Result<NoteFilter, CliError> {
    let mut filter = if args.saved {
        NoteFilter::from_persisted(&state.filters)
    } else {
        NoteFilter::default()
    };
    if let Some(query) = args.query {
        filter.text = query;
    }
    if let Some(tags) = args.tags {
        filter.tags = Some(tag_filter(&tags)?);
    }
    filter.unitat = args.unitat.or(filter.unitat);
    filter.bloc = args.bloc.or(filter.bloc);
    filter.page_url = args.page.or(filter.page_url);
    Ok(filter)
}

/// A bare tag is shorthand for `tags:<tag>`.
fn tag_filter(input: &str) -> Result<TagQuery, CliError> {
    let trimmed = input.trim();
    let query = if trimmed.starts_with("tags:") || trimmed.starts_with("-tags:") {
        parse_tag_query(trimmed)
    } else {
        parse_tag_query(&format!("tags:{}", trimmed))
    };
    query.ok_or_else(|| CliError::InvalidTagQuery(input.to_string()))
}

fn write_note_line(out: &mut dyn Write, note: &Note, preview: usize) -> std::io::Result<()> {
    let location = format_location(note);
    if location.is_empty() {
        writeln!(out, "{}  {}", note.id, note.display_title())?;
    } else {
        writeln!(out, "{}  [{}] {}", note.id, location, note.display_title())?;
    }
    writeln!(out, "    {}", content_preview(&note.content, preview))
}

fn write_report(out: &mut dyn Write, report: &ImportReport) -> std::io::Result<()> {
    writeln!(
        out,
        "imported {}, replaced {}, reassigned {}, skipped {}",
        report.imported, report.replaced, report.reassigned, report.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_tag_is_shorthand() {
        assert_eq!(tag_filter("examen").unwrap(), TagQuery::Has("examen".into()));
        assert_eq!(tag_filter("-tags:vell").unwrap(), TagQuery::Not("vell".into()));
        assert!(matches!(tag_filter("tags:"), Err(CliError::InvalidTagQuery(_))));
    }

    #[test]
    fn subcommand_names() {
        let cli = Cli::try_parse_from(["quadern", "migrate-legacy", "--keep-both"]).unwrap();
        assert!(matches!(cli.command, Command::MigrateLegacy { keep_both: true }));

        let cli = Cli::try_parse_from(["quadern", "--data-dir", "/tmp/q", "rm", "n_1"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/q")));
        assert!(matches!(cli.command, Command::Rm { ref id } if id == "n_1"));

        assert!(Cli::try_parse_from(["quadern", "list", "--section", "s1"]).is_err());
    }

    #[test]
    fn edit_fields_convert() {
        let edit = NoteEdit::from(EditFields {
            title: Some("t".into()),
            tags: None,
            content: None,
        });
        assert_eq!(edit.title.as_deref(), Some("t"));
        assert!(!edit.is_empty());
    }
}
