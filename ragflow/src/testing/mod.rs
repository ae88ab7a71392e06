//! Test doubles for ragflow pipelines.
//!
//! Scripted agents, context stores, rerankers, embedding models and
//! document loaders that record how they were called.

mod mocks;

pub use mocks::{
    HashEmbedding, MockAgent, MockContextStore, MockDocumentLoader, MockReranker, RerankCall,
};
