pub mod assessment;
pub mod chat;
pub mod documents;

pub use assessment::{DetailedAspects, EthicsAssessment, Severity};
pub use chat::{ChatRequest, ChatResponse, SecurityClearance, UserContext, UserRole};
pub use documents::DocumentRecord;
