pub mod batch;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod orchestrator;
pub mod types;

pub use batch::{scrape_many, ScrapeJob};
pub use error::{ScrapeError, ScrapeErrorKind};
pub use extract::{extract_field, extract_page, ExtractedValue};
pub use fetch::{FetchedPage, PageFetcher};
pub use normalize::parse_price;
pub use orchestrator::{ConfigurableScraper, RuleScraper};
pub use types::{ScrapeResult, ScrapedData};
