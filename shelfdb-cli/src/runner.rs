use std::path::PathBuf;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{error, info};

use shelfdb::catalog::{self, Catalog, Clock, FixedClock, NewReview, SystemClock};
use shelfdb::{Error, Result, ShelfDb};

use crate::display;

/// Everything the demo needs, collected from flags and environment.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub data_dir: Option<PathBuf>,
    pub fixture: Option<PathBuf>,
    pub collection: String,
    pub category: String,
    pub max_price: f64,
    pub min_rating: f64,
    pub review_product: String,
    pub review_date: Option<NaiveDate>,
    pub raw_json: bool,
}

fn new_review() -> NewReview {
    NewReview {
        user_id: "U999".into(),
        username: "ReviewerX".into(),
        rating: 4,
        comment: "Good value for a flagship.".into(),
    }
}

fn to_docs<T: serde::Serialize>(rows: &[T]) -> Result<Vec<Value>> {
    rows.iter()
        .map(|row| serde_json::to_value(row).map_err(Error::from))
        .collect()
}

/// Run operations 1 to 5 in order, printing each result.
///
/// Store and seed failures are returned. A missing review target is printed
/// and the run continues; `Ok(false)` reports that it happened.
pub fn run(config: &DemoConfig) -> Result<bool> {
    let db = match &config.data_dir {
        Some(dir) => ShelfDb::open(dir)?,
        None => ShelfDb::in_memory(),
    };
    let products = match &config.fixture {
        Some(path) => catalog::fixture::load_path(path)?,
        None => catalog::fixture::default_products()?,
    };
    let catalog = Catalog::new(&db, config.collection.as_str());
    let raw = config.raw_json;

    let seeded = catalog.seed(&products)?;
    println!("{}", display::notice("1. Data Loaded Successfully"));
    info!(seeded, "operation 1 complete");

    println!();
    println!("{}", display::operation_header(2, "Affordable Electronics"));
    let affordable = catalog.products_in_category_below(&config.category, config.max_price)?;
    println!("{}", display::format_documents(&to_docs(&affordable)?, raw));

    println!();
    println!("{}", display::operation_header(3, "Highly Rated Products"));
    let rated = catalog.highly_rated(config.min_rating)?;
    println!("{}", display::format_documents(&to_docs(&rated)?, raw));

    println!();
    println!(
        "{}",
        display::operation_header(4, &format!("Adding Review to {}", config.review_product))
    );
    let clock: Box<dyn Clock> = match config.review_date {
        Some(date) => Box::new(FixedClock(date)),
        None => Box::new(SystemClock),
    };
    let mut completed = true;
    match catalog.append_review(&config.review_product, new_review(), clock.as_ref()) {
        Ok(review) => {
            println!("{}", display::notice("Review added."));
            println!("{}", display::format_document(&serde_json::to_value(&review)?, raw));
        }
        Err(e @ Error::ProductNotFound(_)) => {
            error!(product_id = %config.review_product, "review not added");
            eprintln!("{}", display::format_error(&e));
            completed = false;
        }
        Err(e) => return Err(e),
    }

    println!();
    println!("{}", display::operation_header(5, "Category Price Analysis"));
    let summary = catalog.category_price_summary()?;
    println!("{}", display::format_documents(&to_docs(&summary)?, raw));

    Ok(completed)
}
