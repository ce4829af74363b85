//! Citations domain - turns a raw platform response into an ordered, deduplicated
//! list of cited URLs.

pub mod extractor;
pub mod strategies;
pub mod types;

pub use extractor::{extract_citations, CitationExtractor};
pub use strategies::native_citations_from_body;
pub use types::{Citation, CitationSource, RawCitation, ResponseEnvelope};
