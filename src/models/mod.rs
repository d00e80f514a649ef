pub mod answer;
pub mod attempt;
pub mod ids;
pub mod question;
pub mod save;

pub use answer::AnswerPayload;
pub use attempt::AttemptState;
pub use ids::QuestionId;
pub use question::{option_letter, Choice, Question, QuestionType, ResumeSnapshot, StartedAttempt};
pub use save::{QuestionResult, QueueItem, SavePayload, SubmitRequest, SubmitResult};
