mod display;
mod runner;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use runner::DemoConfig;

#[derive(Parser, Debug)]
#[command(
    name = "shelfdb-catalog",
    about = "Load the product catalog into ShelfDB and run the canned queries"
)]
struct Cli {
    /// Database directory (in-memory when omitted)
    #[arg(long, env = "SHELFDB_DATA")]
    data: Option<PathBuf>,

    /// Catalog JSON file (built-in catalog when omitted)
    #[arg(long, env = "SHELFDB_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Collection holding the products
    #[arg(long, env = "SHELFDB_COLLECTION", default_value = shelfdb::catalog::DEFAULT_COLLECTION)]
    collection: String,

    /// Category for the price query
    #[arg(long, default_value = shelfdb::catalog::AFFORDABLE_CATEGORY)]
    category: String,

    /// Exclusive upper price bound for the price query
    #[arg(long, default_value_t = shelfdb::catalog::AFFORDABLE_MAX_PRICE)]
    max_price: f64,

    /// Minimum average review rating
    #[arg(long, default_value_t = shelfdb::catalog::HIGH_RATING_THRESHOLD)]
    min_rating: f64,

    /// Product that receives the new review
    #[arg(long, default_value = "ELEC001")]
    review_product: String,

    /// Date stamped on the new review, YYYY-MM-DD (today when omitted)
    #[arg(long)]
    review_date: Option<NaiveDate>,

    /// Output raw JSON (no pretty-printing)
    #[arg(long)]
    json: bool,
}

impl From<Cli> for DemoConfig {
    fn from(cli: Cli) -> Self {
        DemoConfig {
            data_dir: cli.data,
            fixture: cli.fixture,
            collection: cli.collection,
            category: cli.category,
            max_price: cli.max_price,
            min_rating: cli.min_rating,
            review_product: cli.review_product,
            review_date: cli.review_date,
            raw_json: cli.json,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DemoConfig::from(Cli::parse());

    match runner::run(&config) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("{}", display::format_error(&e));
            std::process::exit(1);
        }
    }
}
