pub mod context;
pub mod extractors;
pub mod formats;
pub mod router;

pub use context::{ExtractionContext, FigureSink};
pub use extractors::{CommandExtractor, ImageExtractor, PlainTextExtractor};
pub use formats::{DocumentExtractor, FormatRegistry, Frame, normalize_extension};
pub use router::{
    Disposition, ExtractionRequest, ExtractionRouter, PDF_PARAMS_HEADER,
    parse_content_disposition,
};
