use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::ChatConfig;

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// 单条对话记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct Session {
    turns: VecDeque<ChatTurn>,
    /// 最近一次写入的序号，用于淘汰
    last_touch: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    clock: u64,
}

/// 会话记忆，按会话保存有限轮数的对话历史
#[derive(Debug)]
pub struct ChatMemory {
    sessions: RwLock<Sessions>,
    max_history_turns: usize,
    max_sessions: usize,
}

impl Default for ChatMemory {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}

impl ChatMemory {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            max_history_turns: config.max_history_turns,
            max_sessions: config.max_sessions.max(1),
        }
    }

    /// 获取会话历史（按时间顺序）
    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        let sessions = self.sessions.read().await;
        sessions
            .by_id
            .get(session_id)
            .map(|session| session.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 记录一轮问答
    pub async fn record_exchange(&self, session_id: &str, question: ChatTurn, answer: ChatTurn) {
        if self.max_history_turns == 0 {
            return;
        }

        let mut sessions = self.sessions.write().await;

        sessions.clock += 1;
        let touch = sessions.clock;

        if !sessions.by_id.contains_key(session_id) && sessions.by_id.len() >= self.max_sessions {
            // 淘汰最久未更新的会话
            let stale = sessions
                .by_id
                .iter()
                .min_by_key(|(_, session)| session.last_touch)
                .map(|(id, _)| id.clone());
            if let Some(stale) = stale {
                sessions.by_id.remove(&stale);
            }
        }

        let session = sessions
            .by_id
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                turns: VecDeque::new(),
                last_touch: touch,
            });

        session.turns.push_back(question);
        session.turns.push_back(answer);
        while session.turns.len() > self.max_history_turns * 2 {
            session.turns.pop_front();
        }
        session.last_touch = touch;
    }

    #[cfg(test)]
    pub(crate) async fn session_count(&self) -> usize {
        self.sessions.read().await.by_id.len()
    }
}
