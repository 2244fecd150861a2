//! Scripted widget factory for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::widget::bridge::EventHooks;
use crate::widget::factory::{
    EmbedConfig, ExportedDocument, WidgetControl, WidgetFactory, WidgetRequest,
};

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Succeed,
    Fail(String),
    Panic,
}

/// Everything the fake factory and its controls observed.
#[derive(Debug, Clone, Default)]
pub(crate) struct Calls {
    pub creates: Arc<Mutex<Vec<EmbedConfig>>>,
    pub hooks: Arc<Mutex<Vec<EventHooks>>>,
    pub refreshes: Arc<AtomicU32>,
    pub exports: Arc<AtomicU32>,
    pub releases: Arc<AtomicU32>,
}

impl Calls {
    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn latest_hooks(&self) -> EventHooks {
        self.hooks.lock().unwrap().last().cloned().expect("factory was called")
    }

    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn export_count(&self) -> u32 {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeFactory {
    pub calls: Calls,
    creates: VecDeque<Behavior>,
    operations: Behavior,
}

impl FakeFactory {
    /// Factory whose successive `create` calls follow `creates`, then succeed.
    pub fn scripted(creates: impl IntoIterator<Item = Behavior>) -> Self {
        Self {
            calls: Calls::default(),
            creates: creates.into_iter().collect(),
            operations: Behavior::Succeed,
        }
    }

    pub fn succeeding() -> Self {
        Self::scripted([])
    }

    pub fn with_operations(mut self, behavior: Behavior) -> Self {
        self.operations = behavior;
        self
    }
}

impl WidgetFactory for FakeFactory {
    fn create(
        &mut self,
        request: &WidgetRequest,
        hooks: EventHooks,
    ) -> Result<Box<dyn WidgetControl>, String> {
        self.calls.creates.lock().unwrap().push(request.embed.clone());
        self.calls.hooks.lock().unwrap().push(hooks);
        match self.creates.pop_front().unwrap_or(Behavior::Succeed) {
            Behavior::Succeed => Ok(Box::new(FakeControl {
                calls: self.calls.clone(),
                behavior: self.operations.clone(),
            })),
            Behavior::Fail(detail) => Err(detail),
            Behavior::Panic => panic!("embedding library not loaded"),
        }
    }
}

struct FakeControl {
    calls: Calls,
    behavior: Behavior,
}

impl FakeControl {
    fn outcome(&self) -> Result<(), String> {
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(detail) => Err(detail.clone()),
            Behavior::Panic => panic!("widget handle crashed"),
        }
    }
}

#[async_trait]
impl WidgetControl for FakeControl {
    async fn refresh(&mut self) -> Result<(), String> {
        self.calls.refreshes.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn export_to_pdf(&mut self) -> Result<ExportedDocument, String> {
        self.calls.exports.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(ExportedDocument {
            file_name: "dashboard.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.7".to_vec(),
        })
    }

    fn release(&mut self) {
        self.calls.releases.fetch_add(1, Ordering::SeqCst);
    }
}
