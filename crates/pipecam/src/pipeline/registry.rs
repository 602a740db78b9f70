// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pipeline handler registry
//!
//! Handlers are registered by name with a factory creating fresh
//! instances. The camera manager tries them in registration order, so the
//! order is part of the behaviour: the first handler to acquire a media
//! device owns it.

use std::sync::{Mutex, MutexGuard, OnceLock};

use super::uvc::UvcPipeline;
use super::vimc::VimcPipeline;
use super::PipelineHandler;
use crate::category;
use crate::Error;

/// Creates a new, unmatched handler instance.
pub type PipelineFactory = fn() -> Box<dyn PipelineHandler>;

static GLOBAL: OnceLock<Mutex<PipelineRegistry>> = OnceLock::new();

fn vimc() -> Box<dyn PipelineHandler> {
    Box::new(VimcPipeline::new())
}

fn uvc() -> Box<dyn PipelineHandler> {
    Box::new(UvcPipeline::new())
}

/// Ordered name to factory table.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    entries: Vec<(&'static str, PipelineFactory)>,
}

impl PipelineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The handlers shipped with the crate: "vimc" then "uvcvideo".
    pub fn with_builtins() -> Self {
        PipelineRegistry {
            entries: vec![("vimc", vimc as PipelineFactory), ("uvcvideo", uvc as PipelineFactory)],
        }
    }

    /// The process-wide registry, created with the builtin handlers.
    pub fn global() -> MutexGuard<'static, PipelineRegistry> {
        GLOBAL
            .get_or_init(|| Mutex::new(PipelineRegistry::with_builtins()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a handler. Names are unique.
    pub fn register(&mut self, name: &'static str, factory: PipelineFactory) -> Result<(), Error> {
        if self.get(name).is_some() {
            return Err(Error::DuplicatePipeline(name.to_string()));
        }

        log::debug!(target: category::PIPELINE, "Registered pipeline handler {}", name);
        self.entries.push((name, factory));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PipelineFactory> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, factory)| *factory)
    }

    /// Handler names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handlers to try, in order.
    ///
    /// Without a selection every handler is returned in registration order.
    /// With one, only the selected handlers are returned, in selection
    /// order; unknown names are logged and skipped.
    pub fn select(&self, selection: Option<&[String]>) -> Vec<(&'static str, PipelineFactory)> {
        let Some(selection) = selection else {
            return self.entries.clone();
        };

        let mut selected: Vec<(&'static str, PipelineFactory)> = Vec::new();
        for name in selection {
            match self.entries.iter().find(|(n, _)| *n == name.as_str()) {
                Some(entry) if !selected.iter().any(|(n, _)| *n == name.as_str()) => {
                    selected.push(*entry)
                }
                Some(_) => {}
                None => log::warn!(target: category::PIPELINE, "Unknown pipeline handler {}", name),
            }
        }
        selected
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
