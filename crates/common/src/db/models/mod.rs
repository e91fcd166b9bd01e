//! SeaORM entity models
//!
//! Database entities for the Recall document store

mod conversation;
mod conversation_turn;
mod credential;
mod document;
mod embedding_cost;
mod sync_log;
mod user;

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, DocType, Document,
    Entity as DocumentEntity, Source,
};

pub use sync_log::{
    ActiveModel as SyncLogActiveModel, Column as SyncLogColumn, Entity as SyncLogEntity,
    SyncLog, SyncStatus,
};

pub use embedding_cost::{
    ActiveModel as EmbeddingCostActiveModel, Column as EmbeddingCostColumn, CostStatus,
    EmbeddingCost, Entity as EmbeddingCostEntity,
};

pub use conversation::{
    ActiveModel as ConversationActiveModel, Column as ConversationColumn, Conversation,
    Entity as ConversationEntity,
};

pub use conversation_turn::{
    ActiveModel as ConversationTurnActiveModel, Column as ConversationTurnColumn,
    ConversationTurn, Entity as ConversationTurnEntity,
};

pub use credential::{
    ActiveModel as CredentialActiveModel, Column as CredentialColumn, Credential,
    Entity as CredentialEntity,
};

pub use user::{ActiveModel as UserActiveModel, Column as UserColumn, Entity as UserEntity, User};
