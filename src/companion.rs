use std::sync::Arc;

use futures_util::StreamExt as _;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::client::Backend;
use crate::config::Config;
use crate::emotion::classify;
use crate::error::{CompanionError, TransportErrorKind};
use crate::history::ConversationHistory;
use crate::storage::KeyValueStore;
use crate::stream::{lines, StreamDecoder};
use crate::types::{
    CompanionEvent, ConversationTurn, EmotionTag, Reply, ReplyOrigin, RequestOptions, Role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Probing,
    CacheHit,
    Requesting,
    Streaming,
    Completed,
    Failed,
}

pub(crate) struct Companion<B: Backend> {
    backend: B,
    store: Arc<dyn KeyValueStore>,
    cache: ResponseCache,
    history: ConversationHistory,
    config: Config,
    phase: Phase,
}

impl<B: Backend> Companion<B> {
    pub fn new(backend: B, store: Arc<dyn KeyValueStore>, config: Config) -> Self {
        let history = ConversationHistory::load(store.as_ref(), config.history_cap);
        let cache = ResponseCache::new(config.cache_ttl(), config.cache_capacity);
        Self {
            backend,
            store,
            cache,
            history,
            config,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn persona(&self) -> &str {
        &self.config.persona
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn clear_history(&mut self) -> usize {
        let count = self.history.clear();
        self.persist_history();
        count
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Never fails, errors become a fixed message with the embarrassed tag
    pub async fn generate(
        &mut self,
        message: &str,
        events: &UnboundedSender<CompanionEvent>,
    ) -> Reply {
        self.phase = Phase::Idle;

        if message.trim().is_empty() {
            return self.say("Por favor, digite algo...", EmotionTag::Neutral, events);
        }

        match self.run(message, events).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("generation failed: {}", err);
                self.enter(Phase::Failed);
                self.say(failure_message(&err), EmotionTag::Embarrassed, events)
            }
        }
    }

    async fn run(
        &mut self,
        message: &str,
        events: &UnboundedSender<CompanionEvent>,
    ) -> Result<Reply, CompanionError> {
        self.enter(Phase::Probing);
        if !self.backend.probe().await {
            return Err(CompanionError::Unavailable);
        }

        if let Some(entry) = self.cache.get(message) {
            let (text, emotion) = (entry.text.clone(), entry.emotion);
            self.enter(Phase::CacheHit);
            let _ = events.send(CompanionEvent::Fragment(text.clone()));
            let _ = events.send(CompanionEvent::Emotion(emotion));
            return Ok(Reply {
                text,
                emotion,
                origin: ReplyOrigin::Cache,
                tokens: None,
            });
        }

        self.enter(Phase::Requesting);
        let options = RequestOptions {
            model: self.config.model.clone(),
            prompt: self.build_prompt(message),
            streaming: true,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let body = self.backend.generate(&options).await?;

        self.enter(Phase::Streaming);
        let mut decoder = StreamDecoder::new();
        let mut emotion = None;
        let mut received = 0;
        let mut records = Box::pin(lines(body));
        while let Some(line) = records.next().await {
            let line = line.map_err(CompanionError::Interrupted)?;
            if let Some(fragment) = decoder.apply(line) {
                received += fragment.chars().count();
                let _ = events.send(CompanionEvent::Fragment(fragment));
                if emotion.is_none() && received > self.config.emotion_threshold {
                    let tag = classify(decoder.text());
                    let _ = events.send(CompanionEvent::Emotion(tag));
                    emotion = Some(tag);
                }
            }
        }
        let (text, tokens) = decoder.finish();

        let emotion = match emotion {
            Some(tag) => tag,
            None => {
                let tag = classify(&text);
                let _ = events.send(CompanionEvent::Emotion(tag));
                tag
            }
        };

        self.complete(message, &text, emotion);
        Ok(Reply {
            text,
            emotion,
            origin: ReplyOrigin::Backend,
            tokens,
        })
    }

    fn complete(&mut self, message: &str, text: &str, emotion: EmotionTag) {
        self.history.push_exchange(
            ConversationTurn::user(message),
            ConversationTurn::agent(text),
        );
        self.persist_history();

        self.cache.put(message, text, emotion);
        let evicted = self.cache.evict();
        if evicted > 0 {
            debug!("evicted {} cache entries", evicted);
        }

        self.enter(Phase::Completed);
        info!(
            "exchange completed ({} chars, {}), history holds {} turns",
            text.chars().count(),
            emotion,
            self.history.len()
        );
    }

    fn persist_history(&self) {
        if let Err(err) = self.history.persist(self.store.as_ref()) {
            warn!("history not persisted: {}", err);
        }
    }

    pub fn build_prompt(&self, message: &str) -> String {
        let persona = &self.config.persona;
        let mut prompt = self.config.preamble.clone();
        prompt.push_str("\nAqui está o histórico da conversa:\n");
        for turn in self.history.iter() {
            match turn.role {
                Role::User => prompt.push_str(&format!("Pessoa: {}\n", turn.content)),
                Role::Agent => prompt.push_str(&format!("{}: {}\n", persona, turn.content)),
            }
        }
        prompt.push_str(&format!(
            "\nAgora continue com base na seguinte mensagem:\n\"{}\"\nResponda como {}:",
            message, persona
        ));
        prompt
    }

    fn say(
        &self,
        message: &str,
        emotion: EmotionTag,
        events: &UnboundedSender<CompanionEvent>,
    ) -> Reply {
        let text = format!("{} diz: {}", self.config.persona, message);
        let _ = events.send(CompanionEvent::Fragment(text.clone()));
        let _ = events.send(CompanionEvent::Emotion(emotion));
        Reply {
            text,
            emotion,
            origin: ReplyOrigin::Fallback,
            tokens: None,
        }
    }
}

const GENERIC_FAILURE: &str = "Hmm... aconteceu algo estranho. Pode tentar de novo?";

pub(crate) fn failure_message(err: &CompanionError) -> &'static str {
    match err {
        CompanionError::Unavailable => {
            "Ops! Parece que o Ollama não está rodando no seu computador. \
             Por favor, instale e inicie o Ollama para podermos conversar!"
        }
        CompanionError::Transport(err) => match err.kind {
            TransportErrorKind::Timeout => {
                "A resposta demorou muito tempo. Pode tentar novamente?"
            }
            TransportErrorKind::ConnectionFailure => {
                "Não consegui me conectar ao Ollama. Verifique se ele está rodando!"
            }
            TransportErrorKind::HttpStatus(_) => GENERIC_FAILURE,
        },
        CompanionError::Interrupted(_) => GENERIC_FAILURE,
    }
}
