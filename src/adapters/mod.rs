//! Concrete implementations of the domain ports.

pub mod csv_store;
pub mod evolution;
pub mod gemini;
pub mod google_sheets;
pub mod speech;

pub use csv_store::CsvScheduleStore;
pub use evolution::EvolutionClient;
pub use gemini::GeminiGuidance;
pub use google_sheets::GoogleSheetsStore;
pub use speech::GoogleTranslateTts;
