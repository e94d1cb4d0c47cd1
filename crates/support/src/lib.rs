//! Support domain module: admin-managed FAQ entries.

pub mod faq;

pub use faq::{
    CreateFaq, DeleteFaq, Faq, FaqCommand, FaqCreated, FaqDeleted, FaqEvent, FaqId, FaqUpdated,
    UpdateFaq,
};
