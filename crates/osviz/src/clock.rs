use std::fmt;

use ansi_term::{Color, WithFg};
use argh::FromArgs;
use paging::clock::{Clock, ClockConfig};
use snafu::ResultExt as _;
use snafu_utils::GenericError;

/// Simulate Clock (second-chance) page replacement.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "clock",
    example = "osviz clock --frames 3 1 2 3 2 4 1 5"
)]
pub struct Args {
    /// number of physical frames
    #[argh(option, default = "ClockConfig::default().frame_count")]
    frames: usize,
    /// page reference string, one page per argument
    #[argh(positional)]
    pages: Vec<String>,
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let config = ClockConfig {
        frame_count: args.frames,
    };
    debug!("clock replacer: {config:?}");
    let mut clock = Clock::new(config).whatever_context("invalid frame table")?;

    for page in &args.pages {
        let access = clock.access(page.clone());
        let verdict = if access.kind.is_hit() {
            WithFg::new(Color::Green, "HIT")
        } else {
            WithFg::new(Color::Red, "MISS")
        };
        println!(
            "{} {verdict}",
            WithFg::new(Color::Cyan, format_args!("> {page}"))
        );
        for step in &access.steps {
            println!("  {step}");
        }
        if let Some(evicted) = &access.evicted {
            info!("page {evicted} evicted from frame {}", access.frame);
        }
        trace!("frames: {}", FrameRow(&clock));
    }

    println!();
    print!("{}", Snapshot(&clock));
    Ok(())
}

/// Frames on one line, hand marked with `>`.
struct FrameRow<'a>(&'a Clock<String>);

impl fmt::Display for FrameRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.0.frames().iter().enumerate() {
            let hand = if index == self.0.hand() { ">" } else { " " };
            let page = frame.page().map_or("-", String::as_str);
            write!(f, "{hand}[{page}:{}]", frame.reference_bit())?;
        }
        Ok(())
    }
}

struct Snapshot<'a>(&'a Clock<String>);

impl fmt::Display for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.0;
        writeln!(f, "frame  page      R")?;
        for (index, frame) in clock.frames().iter().enumerate() {
            let page = frame.page().map_or("-", String::as_str);
            write!(f, "{index:>5}  {page:<8}  {}", frame.reference_bit())?;
            if index == clock.hand() {
                write!(f, "  {}", WithFg::new(Color::Yellow, "<- hand"))?;
            }
            writeln!(f)?;
        }

        let stats = clock.stats();
        writeln!(
            f,
            "hits {}, misses {}, hit ratio {:.1}%",
            stats.hits,
            stats.misses,
            stats.hit_ratio() * 100.0
        )?;
        if !clock.history().is_empty() {
            write!(f, "recent:")?;
            for record in clock.history() {
                let mark = if record.kind.is_hit() { 'H' } else { 'M' };
                write!(f, " {}{mark}@{}", record.page, record.frame)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
