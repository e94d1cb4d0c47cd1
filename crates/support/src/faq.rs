use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rawsy_core::error::require_text;
use rawsy_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError};
use rawsy_events::Event;

/// FAQ entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaqId(pub AggregateId);

impl FaqId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.0
    }
}

impl core::fmt::Display for FaqId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for FaqId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Aggregate root: Faq.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Faq {
    id: FaqId,
    question: String,
    answer: String,
    tags: Vec<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Faq {
    pub fn empty(id: FaqId) -> Self {
        Self {
            id,
            question: String::new(),
            answer: String::new(),
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> FaqId {
        self.id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for Faq {
    type Id = FaqId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFaq {
    pub faq_id: FaqId,
    pub actor: Actor,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFaq {
    pub faq_id: FaqId,
    pub actor: Actor,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub tags: Option<Vec<String>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFaq {
    pub faq_id: FaqId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaqCommand {
    CreateFaq(CreateFaq),
    UpdateFaq(UpdateFaq),
    DeleteFaq(DeleteFaq),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqCreated {
    pub faq_id: FaqId,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqUpdated {
    pub faq_id: FaqId,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqDeleted {
    pub faq_id: FaqId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaqEvent {
    FaqCreated(FaqCreated),
    FaqUpdated(FaqUpdated),
    FaqDeleted(FaqDeleted),
}

impl Event for FaqEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FaqEvent::FaqCreated(_) => "support.faq.created",
            FaqEvent::FaqUpdated(_) => "support.faq.updated",
            FaqEvent::FaqDeleted(_) => "support.faq.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FaqEvent::FaqCreated(e) => e.occurred_at,
            FaqEvent::FaqUpdated(e) => e.occurred_at,
            FaqEvent::FaqDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Faq {
    type Command = FaqCommand;
    type Event = FaqEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "support.faq";

    fn empty(id: AggregateId) -> Self {
        Faq::empty(FaqId::new(id))
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FaqEvent::FaqCreated(e) => {
                self.id = e.faq_id;
                self.question = e.question.clone();
                self.answer = e.answer.clone();
                self.tags = e.tags.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            FaqEvent::FaqUpdated(e) => {
                self.question = e.question.clone();
                self.answer = e.answer.clone();
                self.tags = e.tags.clone();
            }
            FaqEvent::FaqDeleted(_) => {
                self.deleted = true;
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FaqCommand::CreateFaq(cmd) => self.handle_create(cmd),
            FaqCommand::UpdateFaq(cmd) => self.handle_update(cmd),
            FaqCommand::DeleteFaq(cmd) => self.handle_delete(cmd),
        }
    }

    fn is_removed(&self) -> bool {
        self.deleted
    }
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

impl Faq {
    fn ensure_existing(&self, faq_id: FaqId, actor: &Actor) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != faq_id {
            return Err(DomainError::invariant("faq_id mismatch"));
        }
        actor.ensure_admin()
    }

    fn handle_create(&self, cmd: &CreateFaq) -> Result<Vec<FaqEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("faq already exists"));
        }
        cmd.actor.ensure_admin()?;

        Ok(vec![FaqEvent::FaqCreated(FaqCreated {
            faq_id: cmd.faq_id,
            question: require_text("question", &cmd.question)?,
            answer: require_text("answer", &cmd.answer)?,
            tags: clean_tags(&cmd.tags),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateFaq) -> Result<Vec<FaqEvent>, DomainError> {
        self.ensure_existing(cmd.faq_id, &cmd.actor)?;

        let question = match &cmd.question {
            Some(q) => require_text("question", q)?,
            None => self.question.clone(),
        };
        let answer = match &cmd.answer {
            Some(a) => require_text("answer", a)?,
            None => self.answer.clone(),
        };
        let tags = match &cmd.tags {
            Some(tags) => clean_tags(tags),
            None => self.tags.clone(),
        };

        Ok(vec![FaqEvent::FaqUpdated(FaqUpdated {
            faq_id: cmd.faq_id,
            question,
            answer,
            tags,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteFaq) -> Result<Vec<FaqEvent>, DomainError> {
        self.ensure_existing(cmd.faq_id, &cmd.actor)?;

        Ok(vec![FaqEvent::FaqDeleted(FaqDeleted {
            faq_id: cmd.faq_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
