mod admission;
mod chat_service;

pub use admission::{escalation_rule, AdmissionPolicy, BlockOutcome};
pub use chat_service::{
    ChatService, ChatServiceDependencies, CreatedChat, OnlineStatus, ReadOutcome,
    ResolvedChannel, SentMessage, PROFILE_PICTURE_CONTENT_TYPE,
};
