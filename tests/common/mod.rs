#![allow(dead_code)]

use async_trait::async_trait;
use modelsync::error::{ModelSyncError, Result};
use modelsync::fetch::{
    FetchArgs, FetchOutcome, FetchedAsset, FetchedTokenizer, Fetcher, SignalSource, StopSignal,
    Supervisor,
};
use modelsync::models::{Assets, ManifestStore};
use modelsync::ui::Prompt;
use modelsync::Engine;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Manifest kept in memory, shared with the test through the `Arc`
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub assets: Arc<Mutex<Assets>>,
    pub saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new(assets: Assets) -> Self {
        Self {
            assets: Arc::new(Mutex::new(assets)),
            saves: Arc::new(Mutex::new(0)),
        }
    }

    pub fn snapshot(&self) -> Assets {
        self.assets.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl ManifestStore for MemoryStore {
    fn load_assets(&self) -> Result<Assets> {
        Ok(self.snapshot())
    }

    fn save_assets(&mut self, assets: &Assets) -> Result<()> {
        *self.assets.lock().unwrap() = assets.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// Prompt answering from queued answers
#[derive(Default)]
pub struct ScriptedPrompt {
    pub confirms: Mutex<VecDeque<bool>>,
    pub selections: Mutex<VecDeque<Option<String>>>,
    pub multiselections: Mutex<VecDeque<Vec<String>>>,
    pub asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompt {
    pub fn confirming(answers: &[bool]) -> Self {
        let prompt = Self::default();
        prompt.confirms.lock().unwrap().extend(answers.iter().copied());
        prompt
    }

    pub fn selecting(answer: Option<&str>) -> Self {
        let prompt = Self::default();
        prompt
            .selections
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string));
        prompt
    }

    pub fn multiselecting(answer: &[&str]) -> Self {
        let prompt = Self::default();
        prompt
            .multiselections
            .lock()
            .unwrap()
            .push_back(answer.iter().map(|s| (*s).to_string()).collect());
        prompt
    }

    fn record(&self, message: &str) {
        self.asked.lock().unwrap().push(message.to_string());
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, message: &str) -> bool {
        self.record(message);
        self.confirms.lock().unwrap().pop_front().unwrap_or(false)
    }

    fn select(&self, message: &str, _options: &[String]) -> Option<String> {
        self.record(message);
        self.selections.lock().unwrap().pop_front().flatten()
    }

    fn multiselect(
        &self,
        message: &str,
        options: &[String],
        select_all: bool,
        _filterable: bool,
    ) -> Vec<String> {
        self.record(message);
        self.multiselections
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| if select_all { options.to_vec() } else { Vec::new() })
    }
}

/// Scripted answer of the mock fetcher for one model
#[derive(Clone)]
pub enum Reply {
    /// Success echoing the requested tokenizer class
    Echo,
    Outcome(FetchOutcome),
    Fail(i32),
}

/// Fetcher recording every call and answering per model name
#[derive(Clone, Default)]
pub struct MockFetcher {
    pub calls: Arc<Mutex<Vec<FetchArgs>>>,
    pub replies: Arc<Mutex<HashMap<String, Reply>>>,
    pub failing_tokenizers: Arc<Mutex<HashSet<String>>>,
}

impl MockFetcher {
    pub fn reply(self, model: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(model.to_string(), reply);
        self
    }

    /// Fail every fetch of the tokenizer `class`, whatever the model
    pub fn fail_tokenizer(self, class: &str) -> Self {
        self.failing_tokenizers
            .lock()
            .unwrap()
            .insert(class.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FetchArgs> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, args: &FetchArgs, _cancel: CancellationToken) -> Result<FetchOutcome> {
        self.calls.lock().unwrap().push(args.clone());
        if self
            .failing_tokenizers
            .lock()
            .unwrap()
            .contains(&args.tokenizer_class)
        {
            return Err(ModelSyncError::Invocation {
                message: format!("cannot fetch tokenizer {}", args.tokenizer_class),
                exit_code: Some(1),
            });
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&args.model_name)
            .cloned()
            .unwrap_or(Reply::Echo);

        match reply {
            Reply::Echo => Ok(echo(args)),
            Reply::Outcome(outcome) => Ok(outcome),
            Reply::Fail(code) => Err(ModelSyncError::Invocation {
                message: format!("cannot fetch {}", args.model_name),
                exit_code: Some(code),
            }),
        }
    }

    fn fetcher_name(&self) -> &str {
        "mock"
    }
}

/// What a well behaved script prints for `args`
pub fn echo(args: &FetchArgs) -> FetchOutcome {
    let base = args.download_path.join(&args.model_name);
    let tokenizer = (!args.tokenizer_class.is_empty()).then(|| FetchedTokenizer {
        path: base.join(&args.tokenizer_class).to_string_lossy().into_owned(),
        class: args.tokenizer_class.clone(),
        options: args.tokenizer_options.clone(),
    });

    if args.skip_model {
        return FetchOutcome::Populated(FetchedAsset {
            tokenizer,
            ..FetchedAsset::default()
        });
    }
    FetchOutcome::Populated(FetchedAsset {
        path: base.join("model").to_string_lossy().into_owned(),
        module: args.model_module.clone(),
        class: args.model_class.clone(),
        options: args.model_options.clone(),
        tokenizer,
    })
}

/// Signal source that never fires
pub struct NoSignal;

#[async_trait]
impl SignalSource for NoSignal {
    async fn recv(&self) -> StopSignal {
        std::future::pending().await
    }
}

pub fn engine(
    store: &MemoryStore,
    fetcher: &MockFetcher,
    prompt: ScriptedPrompt,
    download_root: &Path,
) -> Engine {
    Engine::new(
        Box::new(store.clone()),
        Supervisor::new(Arc::new(fetcher.clone()), Arc::new(NoSignal)),
        Box::new(prompt),
        download_root.to_path_buf(),
    )
}
