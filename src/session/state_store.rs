//! 本地作答状态
//!
//! 作答进度的唯一来源。每次变更都把完整状态写入持久化存储，
//! 刷新页面（或进程重启）后可以不经网络立即恢复。
//! 持久化失败只记录日志，内存中的状态继续有效。

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::status::SyncStatus;
use crate::models::{
    AnswerPayload, AttemptState, Question, QuestionId, QuestionType, ResumeSnapshot,
    SavePayload,
};
use crate::storage::{attempt_state_key, read_json, write_json, DurableStore};

/// 数字快捷键的最大值
const MAX_OPTION_KEY: usize = 9;

/// 翻题方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// 单次作答的本地状态存储
pub struct AttemptStore {
    attempt_id: String,
    key: String,
    questions: Vec<Question>,
    state: AttemptState,
    store: Arc<dyn DurableStore>,
    discarded: bool,
}

impl AttemptStore {
    /// 创建空白状态，不读取已有数据
    pub fn new(attempt_id: impl Into<String>, questions: Vec<Question>, store: Arc<dyn DurableStore>) -> Self {
        let attempt_id = attempt_id.into();
        Self {
            key: attempt_state_key(&attempt_id),
            attempt_id,
            questions,
            state: AttemptState::default(),
            store,
            discarded: false,
        }
    }

    /// 恢复作答状态
    ///
    /// 先读取本地持久化状态，再用服务端续答快照覆盖其定义的键。
    /// 只存在于本地的键（例如离线时设置的标记）保留。
    ///
    /// # 参数
    /// - `attempt_id`: 作答 ID
    /// - `questions`: 题目列表
    /// - `store`: 持久化存储
    /// - `resume`: 服务端续答快照，获取失败时为 `None`
    pub fn restore(
        attempt_id: impl Into<String>,
        questions: Vec<Question>,
        store: Arc<dyn DurableStore>,
        resume: Option<ResumeSnapshot>,
    ) -> Self {
        let mut this = Self::new(attempt_id, questions, store);

        match read_json::<AttemptState>(this.store.as_ref(), &this.key) {
            Ok(Some(local)) => {
                info!(
                    "[作答 {}] 📂 恢复本地状态: 已答 {} 题，标记 {} 题",
                    this.attempt_id,
                    local.answers.len(),
                    local.flagged.values().filter(|f| **f).count()
                );
                this.state = local;
            }
            Ok(None) => {}
            Err(e) => warn!("[作答 {}] ⚠️ 本地状态无法读取，从空白开始: {}", this.attempt_id, e),
        }

        if let Some(snapshot) = resume {
            this.merge_resume(snapshot);
        }

        this.state.current_index = this.clamp_index(this.state.current_index);
        this.persist();
        this
    }

    fn merge_resume(&mut self, snapshot: ResumeSnapshot) {
        let mut overwritten = 0;
        if let Some(answers) = snapshot.answers {
            overwritten += answers.len();
            self.state.answers.extend(answers);
        }
        if let Some(times) = snapshot.times {
            overwritten += times.len();
            self.state.times.extend(times);
        }
        if let Some(flagged) = snapshot.flagged {
            overwritten += flagged.len();
            self.state.flagged.extend(flagged);
        }
        debug!("[作答 {}] 续答快照覆盖 {} 个键", self.attempt_id, overwritten);
    }

    fn clamp_index(&self, index: usize) -> usize {
        index.min(self.questions.len().saturating_sub(1))
    }

    /// 把完整状态写入持久化存储，失败只记录日志
    ///
    /// 删除之后不再写入，内存中的状态仍可读取。
    fn persist(&self) {
        if self.discarded {
            return;
        }
        if let Err(e) = write_json(self.store.as_ref(), &self.key, &self.state) {
            warn!("[作答 {}] ⚠️ 本地状态写入失败，仅保留内存状态: {}", self.attempt_id, e);
        }
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.state.current_index)
    }

    /// 替换某题的答案
    pub fn set_answer(&mut self, question_id: QuestionId, answer: AnswerPayload) {
        self.state.answers.insert(question_id, answer);
        self.persist();
    }

    /// 翻转某题的标记
    ///
    /// # 返回
    /// 翻转后的标记值
    pub fn toggle_flag(&mut self, question_id: &QuestionId) -> bool {
        let flagged = !self.state.is_flagged(question_id);
        self.state.flagged.insert(question_id.clone(), flagged);
        self.persist();
        flagged
    }

    /// 前后翻题，到达边界时不动
    ///
    /// # 返回
    /// 下标是否发生变化
    pub fn advance(&mut self, direction: Direction) -> bool {
        let current = self.state.current_index;
        let next = match direction {
            Direction::Next => self.clamp_index(current + 1),
            Direction::Prev => current.saturating_sub(1),
        };
        if next == current {
            return false;
        }
        self.state.current_index = next;
        self.persist();
        true
    }

    /// 直接跳到第 `index` 题，越界时不动
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index >= self.questions.len() {
            return false;
        }
        if index != self.state.current_index {
            self.state.current_index = index;
            self.persist();
        }
        true
    }

    /// 给某题累计一个单位的用时
    pub fn tick(&mut self, question_id: &QuestionId) {
        *self.state.times.entry(question_id.clone()).or_insert(0) += 1;
        self.persist();
    }

    /// 给当前题累计用时
    pub fn tick_current(&mut self) -> Option<QuestionId> {
        let question_id = self.current_question()?.id.clone();
        self.tick(&question_id);
        Some(question_id)
    }

    /// 数字键快捷作答（1 对应第一个选项）
    ///
    /// 只接受 1-9 且不超过当前题的选项数。单选直接设为该选项，多选切换该选项，其余题型忽略。
    pub fn answer_by_option(&mut self, n: usize) -> bool {
        if !(1..=MAX_OPTION_KEY).contains(&n) {
            return false;
        }
        let Some(question) = self.current_question() else {
            return false;
        };
        let Some(letter) = question.choice_letters().into_iter().nth(n - 1) else {
            return false;
        };
        let question_id = question.id.clone();

        let answer = match question.question_type {
            QuestionType::Mcq => AnswerPayload::Text(letter),
            QuestionType::Multi => {
                let mut picked = match self.state.answers.get(&question_id) {
                    Some(AnswerPayload::Choices(items)) => items.clone(),
                    _ => Vec::new(),
                };
                if let Some(pos) = picked.iter().position(|l| *l == letter) {
                    picked.remove(pos);
                } else {
                    picked.push(letter);
                }
                AnswerPayload::Choices(picked)
            }
            QuestionType::Fib | QuestionType::Structured => return false,
        };

        self.set_answer(question_id, answer);
        true
    }

    pub fn answered_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| self.state.is_answered(&q.id))
            .count()
    }

    pub fn flagged_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| self.state.is_flagged(&q.id))
            .count()
    }

    fn payload_for(&self, question_id: &QuestionId) -> SavePayload {
        SavePayload {
            question_id: question_id.clone(),
            answer: self.state.answers.get(question_id).cloned(),
            time_spent: self.state.time_spent(question_id),
            flagged: self.state.is_flagged(question_id),
        }
    }

    /// 当前题的保存请求体
    pub fn current_payload(&self) -> Option<SavePayload> {
        let question = self.current_question()?;
        Some(self.payload_for(&question.id))
    }

    /// 所有题目的完整作答，按题目顺序
    pub fn responses(&self) -> Vec<SavePayload> {
        self.questions.iter().map(|q| self.payload_for(&q.id)).collect()
    }

    /// 记录一次自动保存
    pub fn mark_saved(&mut self, now_ms: i64, status: SyncStatus) {
        self.state.last_saved_at = Some(now_ms);
        self.state.saved_message = status.to_string();
        self.persist();
    }

    pub fn set_status(&mut self, status: SyncStatus) {
        self.state.saved_message = status.to_string();
        self.persist();
    }

    /// 删除持久化状态（提交成功后），之后的变更只保留在内存中
    pub fn discard(&mut self) {
        self.discarded = true;
        match self.store.remove(&self.key) {
            Ok(()) => debug!("[作答 {}] 🗑 本地状态已删除", self.attempt_id),
            Err(e) => warn!("[作答 {}] ⚠️ 删除本地状态失败: {}", self.attempt_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::Choice;
    use crate::storage::MemoryStore;

    fn questions() -> Vec<Question> {
        vec![
            Question::new(101, QuestionType::Mcq, "Q1"),
            Question::new(102, QuestionType::Multi, "Q2"),
            Question::new(103, QuestionType::Fib, "Q3"),
        ]
    }

    fn stored(store: &MemoryStore) -> AttemptState {
        let raw = store.raw(&attempt_state_key("a1")).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_advance_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let mut attempt = AttemptStore::new("a1", questions(), store);

        assert!(!attempt.advance(Direction::Prev));
        assert_eq!(attempt.current_index(), 0);

        assert!(attempt.advance(Direction::Next));
        assert!(attempt.advance(Direction::Next));
        assert!(!attempt.advance(Direction::Next));
        assert_eq!(attempt.current_index(), 2);
    }

    #[test]
    fn test_jump_to_rejects_out_of_range() {
        let mut attempt = AttemptStore::new("a1", questions(), Arc::new(MemoryStore::new()));
        assert!(attempt.jump_to(2));
        assert!(!attempt.jump_to(3));
        assert_eq!(attempt.current_index(), 2);
    }

    #[test]
    fn test_every_mutation_is_mirrored() {
        let store = MemoryStore::new();
        let mut attempt = AttemptStore::new("a1", questions(), Arc::new(store.clone()));

        attempt.set_answer(101.into(), AnswerPayload::text("A"));
        assert_eq!(stored(&store).answers[&QuestionId::Num(101)], AnswerPayload::text("A"));

        assert!(attempt.toggle_flag(&102.into()));
        assert!(stored(&store).is_flagged(&QuestionId::Num(102)));

        attempt.tick(&101.into());
        attempt.tick(&101.into());
        assert_eq!(stored(&store).time_spent(&QuestionId::Num(101)), 2);

        assert!(!attempt.toggle_flag(&102.into()));
        assert!(!stored(&store).is_flagged(&QuestionId::Num(102)));
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let mut attempt = AttemptStore::new("a1", questions(), Arc::new(store.clone()));

        attempt.set_answer(101.into(), AnswerPayload::text("C"));
        assert!(attempt.state().is_answered(&QuestionId::Num(101)));
        assert!(store.raw(&attempt_state_key("a1")).is_none());
    }

    #[test]
    fn test_restore_server_wins_and_local_only_survives() {
        let store = MemoryStore::new();
        {
            let mut local = AttemptStore::new("a1", questions(), Arc::new(store.clone()));
            local.set_answer(101.into(), AnswerPayload::text("A"));
            local.set_answer(103.into(), AnswerPayload::text("local"));
            local.toggle_flag(&102.into());
            local.jump_to(1);
        }

        let resume = ResumeSnapshot {
            answers: Some(BTreeMap::from([(QuestionId::Num(101), AnswerPayload::text("B"))])),
            times: Some(BTreeMap::from([(QuestionId::Num(101), 40)])),
            flagged: None,
        };
        let attempt = AttemptStore::restore("a1", questions(), Arc::new(store.clone()), Some(resume));

        let state = attempt.state();
        assert_eq!(state.answers[&QuestionId::Num(101)], AnswerPayload::text("B"));
        assert_eq!(state.answers[&QuestionId::Num(103)], AnswerPayload::text("local"));
        assert!(state.is_flagged(&QuestionId::Num(102)));
        assert_eq!(state.time_spent(&QuestionId::Num(101)), 40);
        assert_eq!(attempt.current_index(), 1);
        assert_eq!(stored(&store), *state);
    }

    #[test]
    fn test_restore_clamps_index_and_ignores_corrupt_state() {
        let store = MemoryStore::new();
        store.set(&attempt_state_key("a1"), r#"{"currentIndex": 9}"#).unwrap();
        let attempt = AttemptStore::restore("a1", questions(), Arc::new(store.clone()), None);
        assert_eq!(attempt.current_index(), 2);

        store.set(&attempt_state_key("a1"), "{not json").unwrap();
        let attempt = AttemptStore::restore("a1", questions(), Arc::new(store), None);
        assert_eq!(*attempt.state(), AttemptState::default());
    }

    #[test]
    fn test_answer_by_option() {
        let mut attempt = AttemptStore::new("a1", questions(), Arc::new(MemoryStore::new()));

        assert!(attempt.answer_by_option(2));
        assert_eq!(attempt.state().answers[&QuestionId::Num(101)], AnswerPayload::text("B"));

        attempt.advance(Direction::Next);
        attempt.answer_by_option(3);
        attempt.answer_by_option(1);
        attempt.answer_by_option(3);
        assert_eq!(
            attempt.state().answers[&QuestionId::Num(102)],
            AnswerPayload::Choices(vec!["A".to_string()])
        );

        attempt.advance(Direction::Next);
        assert!(!attempt.answer_by_option(1));
        assert!(!attempt.answer_by_option(0));
    }

    #[test]
    fn test_answer_by_option_respects_choice_count() {
        let mut mcq = Question::new(201, QuestionType::Mcq, "four choices");
        mcq.choices = Some(
            ["A", "B", "C", "D"]
                .iter()
                .map(|c| Choice::Plain(c.to_string()))
                .collect(),
        );
        let mut attempt = AttemptStore::new("a1", vec![mcq], Arc::new(MemoryStore::new()));

        assert!(!attempt.answer_by_option(5));
        assert!(!attempt.answer_by_option(26));
        assert!(!attempt.state().is_answered(&QuestionId::Num(201)));

        assert!(attempt.answer_by_option(4));
        assert_eq!(attempt.state().answers[&QuestionId::Num(201)], AnswerPayload::text("D"));
    }

    #[test]
    fn test_answer_by_option_uses_choice_labels() {
        let mut mcq = Question::new(202, QuestionType::Mcq, "labelled");
        mcq.choices = Some(vec![
            Choice::Plain("A".to_string()),
            Choice::Plain("B".to_string()),
        ]);
        let mut questions = vec![mcq];
        // 未提供选项时默认 A-D
        questions.push(Question::new(203, QuestionType::Mcq, "defaults"));
        let mut attempt = AttemptStore::new("a1", questions, Arc::new(MemoryStore::new()));

        assert!(!attempt.answer_by_option(3));
        attempt.advance(Direction::Next);
        assert!(attempt.answer_by_option(3));
        assert!(!attempt.answer_by_option(5));
        assert_eq!(attempt.state().answers[&QuestionId::Num(203)], AnswerPayload::text("C"));
    }

    #[test]
    fn test_counts_and_responses() {
        let mut attempt = AttemptStore::new("a1", questions(), Arc::new(MemoryStore::new()));
        attempt.set_answer(101.into(), AnswerPayload::text("A"));
        attempt.set_answer(103.into(), AnswerPayload::text(""));
        attempt.toggle_flag(&103.into());
        attempt.tick(&101.into());

        assert_eq!(attempt.answered_count(), 1);
        assert_eq!(attempt.flagged_count(), 1);

        let responses = attempt.responses();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].time_spent, 1);
        assert_eq!(responses[1].answer, None);
        assert!(responses[2].flagged);
    }

    #[test]
    fn test_discard_removes_key() {
        let store = MemoryStore::new();
        let mut attempt = AttemptStore::new("a1", questions(), Arc::new(store.clone()));
        attempt.mark_saved(1_000, SyncStatus::Saved);
        assert_eq!(stored(&store).saved_message, "Saved");

        attempt.discard();
        assert!(store.raw(&attempt_state_key("a1")).is_none());

        attempt.set_status(SyncStatus::AllSynced);
        attempt.tick(&101.into());
        assert!(store.raw(&attempt_state_key("a1")).is_none());
        assert_eq!(attempt.state().saved_message, "All saves synced");
    }
}
