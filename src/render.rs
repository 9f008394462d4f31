//! Terminal output for the `findstream` binary.

use crate::error::SearchError;
use crate::protocol::{FileMatches, StreamEvent};
use crate::results::{SearchResults, SearchStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Split `context` around a match given as character offsets.
///
/// Offsets past the end are clamped, so a server reporting offsets in a
/// different unit never panics the renderer.
pub fn split_match(context: &str, start: u64, end: u64) -> (&str, &str, &str) {
    let byte_at = |offset: u64| {
        context
            .char_indices()
            .nth(offset as usize)
            .map(|(i, _)| i)
            .unwrap_or(context.len())
    };
    let start = byte_at(start);
    let end = byte_at(end).max(start);
    (&context[..start], &context[start..end], &context[end..])
}

pub fn write_file_matches<W: WriteColor>(out: &mut W, file: &FileMatches) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    write!(out, "{}", file.resource.path)?;
    out.reset()?;
    writeln!(out, " ({} matches)", file.matches.len())?;

    for m in &file.matches {
        write!(out, "  ")?;
        if let Some(xpath) = &m.xpath {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(out, "{}: ", xpath)?;
            out.reset()?;
        }
        let (before, hit, after) = split_match(&m.context, m.match_start, m.match_end);
        write!(out, "{}", before)?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "{}", hit)?;
        out.reset()?;
        writeln!(out, "{}", after)?;
    }
    Ok(())
}

pub fn write_summary<W: WriteColor>(out: &mut W, results: &SearchResults) -> io::Result<()> {
    match &results.status {
        SearchStatus::Completed(done) => {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            writeln!(
                out,
                "{} matches in {} of {} resources ({} ms)",
                done.total_matches, done.resources_with_matches, done.total_resources, done.duration_ms
            )?;
            out.reset()?;
        }
        SearchStatus::Failed(err) => write_error(out, err)?,
        SearchStatus::Cancelled => writeln!(
            out,
            "Search cancelled after {} matches",
            results.match_count()
        )?,
        SearchStatus::Idle | SearchStatus::Running => writeln!(
            out,
            "Search ended without a completion report; {} matches received",
            results.match_count()
        )?,
    }
    Ok(())
}

pub fn write_error<W: WriteColor>(out: &mut W, err: &SearchError) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
    write!(out, "[{}] ", err.kind())?;
    out.reset()?;
    writeln!(out, "{}", err.user_message())
}

/// Streams events to stdout while keeping a progress bar on stderr.
pub struct Renderer {
    out: StandardStream,
    bar: ProgressBar,
}

impl Renderer {
    pub fn new(color: ColorChoice, multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} resources {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self {
            out: StandardStream::stdout(color),
            bar,
        }
    }

    pub fn event(&mut self, event: &StreamEvent) -> io::Result<()> {
        match event {
            StreamEvent::TaskStarted(started) => {
                self.bar.set_length(started.total_resources);
                Ok(())
            }
            StreamEvent::Progress(progress) => {
                self.bar.set_length(progress.total_resources);
                self.bar.set_position(progress.resources_processed);
                self.bar
                    .set_message(format!("{} matches", progress.matches_found));
                Ok(())
            }
            StreamEvent::FileMatches(file) => {
                let out = &mut self.out;
                self.bar.suspend(|| write_file_matches(out, file))
            }
            StreamEvent::Completed(_) | StreamEvent::Failed(_) => Ok(()),
        }
    }

    pub fn finish(&mut self, results: &SearchResults) -> io::Result<()> {
        self.bar.finish_and_clear();
        write_summary(&mut self.out, results)
    }
}
