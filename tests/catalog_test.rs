//! End-to-end runs of the catalog operations against the built-in fixture.

use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;

use shelfdb::catalog::{
    self, Catalog, FixedClock, HIGH_RATING_THRESHOLD, NewReview, Product, fixture,
};
use shelfdb::{Error, ShelfDb};

fn seeded() -> (ShelfDb, Vec<Product>) {
    let db = ShelfDb::in_memory();
    let products = fixture::default_products().expect("fixture parses");
    Catalog::new(&db, catalog::DEFAULT_COLLECTION)
        .seed(&products)
        .expect("seed succeeds");
    (db, products)
}

fn reviewer_x() -> NewReview {
    NewReview {
        user_id: "U999".into(),
        username: "ReviewerX".into(),
        rating: 4,
        comment: "Good value for a flagship.".into(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

#[test]
fn seed_stores_every_product_unchanged_and_in_order() {
    let (db, products) = seeded();
    let stored = Catalog::new(&db, "products").products().unwrap();
    assert_eq!(stored, products);
}

#[test]
fn reseeding_replaces_previous_contents() {
    let (db, products) = seeded();
    let catalog = Catalog::new(&db, "products");
    catalog.append_review("ELEC001", reviewer_x(), &FixedClock(date(2024, 3, 1))).unwrap();

    assert_eq!(catalog.seed(&products).unwrap(), 10);
    assert_eq!(catalog.products().unwrap(), products);
}

#[test]
fn duplicate_product_id_fails_seed_and_inserts_nothing() {
    let db = ShelfDb::in_memory();
    let mut products = fixture::default_products().unwrap();
    products.push(products[0].clone());

    let catalog = Catalog::new(&db, "products");
    let err = catalog.seed(&products).unwrap_err();
    assert!(matches!(err, Error::UniqueViolation { ref field } if field == "product_id"));
    assert!(catalog.products().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Affordable electronics
// ---------------------------------------------------------------------------

#[test]
fn affordable_electronics_scenario() {
    let (db, _) = seeded();
    let found = Catalog::new(&db, "products").affordable_electronics().unwrap();
    let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Sony WH-1000XM5 Headphones",
            "Dell 27-inch 4K Monitor",
            "OnePlus Nord CE 3",
        ]
    );
    assert_eq!(found[0].price, 29990.0);
    assert_eq!(found[0].stock, 200);
}

#[test]
fn affordable_query_returns_only_projected_fields() {
    let (db, _) = seeded();
    let raw = db
        .find_with_options(
            "products",
            &json!({"category": "Electronics", "price": {"$lt": 50000}}),
            &shelfdb::FindOptions::default().projection(
                shelfdb::Projection::parse(&json!({"name": 1, "price": 1, "stock": 1, "_id": 0}))
                    .unwrap(),
            ),
        )
        .unwrap();
    assert_eq!(raw.len(), 3);
    for doc in raw {
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "price", "stock"]);
    }
}

#[test]
fn category_price_filter_matches_definition_for_every_product() {
    let (db, products) = seeded();
    let catalog = Catalog::new(&db, "products");
    for (category, bound) in [("Electronics", 50_000.0), ("Fashion", 5_000.0), ("Toys", 1e9)] {
        let got: Vec<String> = catalog
            .products_in_category_below(category, bound)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        let expected: Vec<String> = products
            .iter()
            .filter(|p| p.category == category && p.price < bound)
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(got, expected, "category {category} below {bound}");
    }
}

// ---------------------------------------------------------------------------
// Highly rated
// ---------------------------------------------------------------------------

#[test]
fn highly_rated_matches_mean_of_ratings() {
    let (db, products) = seeded();
    let rated = Catalog::new(&db, "products")
        .highly_rated(HIGH_RATING_THRESHOLD)
        .unwrap();

    let expected: Vec<(String, f64)> = products
        .iter()
        .filter_map(|p| p.average_rating().map(|avg| (p.name.clone(), avg)))
        .filter(|(_, avg)| *avg >= HIGH_RATING_THRESHOLD)
        .collect();
    let got: Vec<(String, f64)> = rated.into_iter().map(|r| (r.name, r.avg_rating)).collect();
    assert_eq!(got, expected);
    // Every fixture product averages at least 4; ELEC001 averages 4.5.
    assert_eq!(got.len(), 10);
    assert_eq!(got[0], ("Samsung Galaxy S21 Ultra".to_string(), 4.5));
}

#[test]
fn products_without_reviews_are_not_highly_rated() {
    let db = ShelfDb::in_memory();
    let mut products = fixture::default_products().unwrap();
    products[1].reviews.clear();
    let catalog = Catalog::new(&db, "products");
    catalog.seed(&products).unwrap();

    let rated = catalog.highly_rated(0.0).unwrap();
    assert_eq!(rated.len(), 9);
    assert!(rated.iter().all(|r| r.name != "Apple MacBook Pro 14-inch"));
}

#[test]
fn threshold_is_inclusive() {
    let (db, _) = seeded();
    let catalog = Catalog::new(&db, "products");
    let above = catalog.highly_rated(4.5).unwrap();
    // ELEC001 sits exactly at 4.5 alongside the perfect fives.
    assert!(above.iter().any(|r| r.name == "Samsung Galaxy S21 Ultra"));
    assert!(above.iter().all(|r| r.avg_rating >= 4.5));
    assert_eq!(above.len(), 7);
}

// ---------------------------------------------------------------------------
// Review append
// ---------------------------------------------------------------------------

#[test]
fn append_review_adds_exactly_one_at_the_end() {
    let (db, products) = seeded();
    let catalog = Catalog::new(&db, "products");
    let clock = FixedClock(date(2024, 3, 15));

    let review = catalog.append_review("ELEC001", reviewer_x(), &clock).unwrap();
    assert_eq!(review.date, date(2024, 3, 15));

    let updated = catalog.product("ELEC001").unwrap().unwrap();
    assert_eq!(updated.reviews.len(), products[0].reviews.len() + 1);
    assert_eq!(&updated.reviews[..2], &products[0].reviews[..]);
    assert_eq!(updated.reviews[2], review);

    let raw = db.find_one("products", &json!({"product_id": "ELEC001"})).unwrap().unwrap();
    assert_eq!(raw["reviews"][2]["date"], "2024-03-15");
    assert_eq!(raw["reviews"][2]["username"], "ReviewerX");
}

#[test]
fn append_review_to_missing_product_is_reported_and_changes_nothing() {
    let (db, products) = seeded();
    let catalog = Catalog::new(&db, "products");

    let err = catalog
        .append_review("NOPE999", reviewer_x(), &FixedClock(date(2024, 3, 15)))
        .unwrap_err();
    assert!(matches!(err, Error::ProductNotFound(ref id) if id == "NOPE999"));
    assert_eq!(catalog.products().unwrap(), products);
}

#[test]
fn appended_review_changes_average() {
    let (db, _) = seeded();
    let catalog = Catalog::new(&db, "products");
    let low = NewReview {
        rating: 1,
        ..reviewer_x()
    };
    catalog
        .append_review("ELEC003", low, &FixedClock(date(2024, 4, 1)))
        .unwrap();
    // (5 + 1) / 2 = 3 drops below the threshold.
    let rated = catalog.highly_rated(HIGH_RATING_THRESHOLD).unwrap();
    assert!(rated.iter().all(|r| r.name != "Sony WH-1000XM5 Headphones"));
}

// ---------------------------------------------------------------------------
// Category price summary
// ---------------------------------------------------------------------------

#[test]
fn category_summary_averages_counts_and_orders() {
    let (db, products) = seeded();
    let summary = Catalog::new(&db, "products").category_price_summary().unwrap();

    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].category, "Electronics");
    assert_eq!(summary[1].category, "Fashion");
    assert!(summary.windows(2).all(|w| w[0].avg_price >= w[1].avg_price));

    for stats in &summary {
        let members: Vec<&Product> = products
            .iter()
            .filter(|p| p.category == stats.category)
            .collect();
        let mean = members.iter().map(|p| p.price).sum::<f64>() / members.len() as f64;
        assert_eq!(stats.product_count, members.len() as u64);
        assert!((stats.avg_price - mean).abs() < 1e-6, "{} vs {mean}", stats.avg_price);
    }
    assert_eq!(summary[1].avg_price, 6748.0);
}

// ---------------------------------------------------------------------------
// Full run, persisted
// ---------------------------------------------------------------------------

#[test]
fn full_sequence_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let products = fixture::default_products().unwrap();
    {
        let db = ShelfDb::open(dir.path()).unwrap();
        let catalog = Catalog::new(&db, "products");
        catalog.seed(&products).unwrap();
        assert_eq!(catalog.affordable_electronics().unwrap().len(), 3);
        catalog
            .append_review("ELEC001", reviewer_x(), &FixedClock(date(2024, 5, 20)))
            .unwrap();
    }

    let db = ShelfDb::open(dir.path()).unwrap();
    let catalog = Catalog::new(&db, "products");
    let elec001 = catalog.product("ELEC001").unwrap().unwrap();
    assert_eq!(elec001.reviews.len(), 3);
    assert_eq!(elec001.reviews[2].date, date(2024, 5, 20));
    assert_eq!(catalog.category_price_summary().unwrap().len(), 2);
}

#[test]
fn review_that_cannot_be_saved_is_not_kept() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("shelf");
    let db = ShelfDb::open(&data).unwrap();
    let catalog = Catalog::new(&db, "products");
    catalog.seed(&fixture::default_products().unwrap()).unwrap();

    std::fs::remove_dir_all(&data).unwrap();
    let err = catalog
        .append_review("ELEC001", reviewer_x(), &FixedClock(date(2024, 5, 20)))
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(catalog.product("ELEC001").unwrap().unwrap().reviews.len(), 2);
}
