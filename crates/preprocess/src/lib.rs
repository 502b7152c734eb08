pub mod preprocess;
pub mod transform;

pub use preprocess::{PreprocessError, PreprocessStrategy, Preprocessor, MAX_OUTPUT_PIXELS};
