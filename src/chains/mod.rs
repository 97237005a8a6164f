pub mod analysis_chain;
pub mod chat_chain;
pub mod research_chain;

pub use analysis_chain::{AnalysisChain, analyze_medical_record, create_analysis_chain};
pub use chat_chain::get_chat_response;
pub use research_chain::search_medical_research;
