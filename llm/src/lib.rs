pub mod converse;
pub mod extract;
pub mod generation;
pub mod synthesize;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use converse::{converse, ConverseError, DEFAULT_SYSTEM_PROMPT};
pub use extract::{ExtractionError, GraphExtractor};
pub use generation::{
    generator_from_config, GenerationError, GenerationRequest, Generator, HttpGenerator,
    InferenceConfig,
};
pub use synthesize::{
    synthesizer_from_config, ModelSynthesizer, SynthesisError, Synthesizer, TemplateSynthesizer,
};
#[cfg(any(test, feature = "test-utils"))]
pub use testing::ScriptedGenerator;
