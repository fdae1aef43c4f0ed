use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use data_encoding::{BASE64, HEXLOWER_PERMISSIVE, HEXUPPER};
use scte35_gen::encoding::{
    BreakDuration, InsertCommand, SpliceCommand, SpliceSection, TimeSignalCommand,
};
use scte35_gen::DescriptorFragment;

#[derive(Debug, Clone, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Base64,
    Hex,
}

#[derive(Parser)]
#[command(name = "scte35-gen")]
#[command(about = "Synthesize SCTE-35 splice information sections")]
#[command(version)]
struct Arguments {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t = OutputFormat::Base64,
        global = true
    )]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize a splice_null section
    Null,

    /// Synthesize a splice_insert section
    Insert {
        /// Splice event identifier
        #[arg(long)]
        event_id: u32,

        /// Cancel the event instead of scheduling it
        #[arg(long)]
        cancel: bool,

        /// Going out of the network (ad break start)
        #[arg(long)]
        out_of_network: bool,

        /// Splice point PTS in 90 kHz ticks; omit for splice_immediate
        #[arg(long)]
        pts: Option<u64>,

        /// Break duration in 90 kHz ticks
        #[arg(long)]
        duration: Option<u64>,

        /// Return to the network automatically after the duration
        #[arg(long)]
        auto_return: bool,

        /// Unique program identifier
        #[arg(long, default_value_t = 0)]
        program_id: u16,
    },

    /// Synthesize a time_signal section
    TimeSignal {
        /// Signalled PTS in 90 kHz ticks; omit for an unspecified time
        #[arg(long)]
        pts: Option<u64>,

        /// Hex-encoded splice descriptor (tag, length, payload); repeatable
        #[arg(long = "descriptor", value_name = "HEX")]
        descriptors: Vec<String>,
    },
}

fn parse_descriptors(raw: &[String]) -> Result<Vec<DescriptorFragment>> {
    raw.iter()
        .map(|hex| {
            let bytes = HEXLOWER_PERMISSIVE
                .decode(hex.as_bytes())
                .with_context(|| format!("invalid hex descriptor: {hex}"))?;
            DescriptorFragment::try_from(bytes)
                .map_err(|_| anyhow!("descriptor framing does not validate: {hex}"))
        })
        .collect()
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();

    let descriptors;
    let section = match &arguments.command {
        Command::Null => SpliceSection::new(SpliceCommand::Null),
        Command::Insert {
            event_id,
            cancel,
            out_of_network,
            pts,
            duration,
            auto_return,
            program_id,
        } => SpliceSection::new(SpliceCommand::Insert(InsertCommand {
            event_id: *event_id,
            cancel: *cancel,
            out_of_network: *out_of_network,
            pts_time: *pts,
            break_duration: duration.map(|duration| BreakDuration {
                auto_return: *auto_return,
                duration,
            }),
            unique_program_id: *program_id,
        })),
        Command::TimeSignal {
            pts,
            descriptors: raw,
        } => {
            descriptors = parse_descriptors(raw)?;
            SpliceSection {
                command: SpliceCommand::TimeSignal(TimeSignalCommand { pts_time: *pts }),
                descriptors: &descriptors,
            }
        }
    };

    let bytes = section.to_bytes().context("section encoding failed")?;
    match arguments.output {
        OutputFormat::Base64 => println!("{}", BASE64.encode(&bytes)),
        OutputFormat::Hex => println!("{}", HEXUPPER.encode(&bytes)),
    }
    Ok(())
}
