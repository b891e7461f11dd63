use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use transit_card::ap::default_factories;
use transit_card::feedback::Feedback;
use transit_card::info::ListItem;
use transit_card::iso7816::{Protocol, ScanOptions};
use transit_card::pcsc::Context;
use transit_card::tlv::info_ber_tlv;
use transit_card::Card;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    Pcsc(#[from] transit_card::pcsc::Error),

    #[error("Input is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Could not serialize the card: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(name = "transit-card")]
#[command(about = "Read ISO7816 transit cards and decode their data")]
#[command(version)]
struct Cli {
    /// Name of the PC/SC reader to use. Defaults to the first one.
    #[arg(short, long, global = true)]
    reader: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the PC/SC readers.
    Readers,

    /// Waits for a card, then reads every application it holds.
    Dump {
        /// Prints the card as JSON instead of a tree.
        #[arg(long)]
        json: bool,

        /// Skips probing for CEPAS.
        #[arg(long)]
        no_cepas: bool,
    },

    /// Decodes BER-TLV given as hex.
    Tlv {
        /// The data, as hex digits.
        data: String,
    },
}

struct LogFeedback;

impl Feedback for LogFeedback {
    fn update_status_text(&self, text: &str) {
        info!("{}", text);
    }

    fn update_progress_bar(&self, progress: u32, max: u32) {
        debug!("Progress: {}/{}", progress, max);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Readers => {
            for reader in Context::try_new()?.readers()? {
                println!("{}", reader);
            }
        }
        Commands::Dump { json, no_cepas } => {
            let ctx = Context::try_new()?;
            let device = ctx.open(cli.reader.as_deref())?;
            let pcsc_card = device.connect(&ctx)?;

            let protocol = Protocol::new(Box::new(pcsc_card));
            let options = ScanOptions {
                probe_cepas: !no_cepas,
            };
            let card = Card::dump(&protocol, &default_factories(), &LogFeedback, &options);

            if json {
                println!("{}", serde_json::to_string_pretty(&card)?);
            } else {
                print_card(&card);
            }
        }
        Commands::Tlv { data } => {
            let data = hex::decode(data.trim())?;
            print_items(&info_ber_tlv(&data));
        }
    }

    Ok(())
}

fn print_card(card: &Card) {
    if card.is_partial_read {
        println!("(partial read)");
    }

    print_items(&card.manufacturing_info());
    print_items(&card.raw_data());
}

fn print_items(items: &[ListItem]) {
    for item in items {
        print!("{}", item);
    }
}
