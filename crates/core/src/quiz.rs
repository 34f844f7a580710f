//! Adaptive quiz session engine.
//!
//! A session walks a batch of entry indices. When a batch is exhausted, every
//! entry whose most recent answer was wrong is retried in the next batch,
//! together with a shrinking random sample of already-correct entries
//! (`floor(sqrt(wrong * total)) - wrong` of them). The session finishes once a
//! batch ends with no wrong entries left.

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::model::{Dictionary, Entry};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("dictionary has no entries")]
    EmptyDictionary,

    #[error("quiz session already finished")]
    Finished,

    #[error("invalid persisted quiz state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// Snapshot of a session's counters, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizProgress {
    /// Entries in the dictionary.
    pub total: usize,
    /// Entries whose most recent answer was correct.
    pub mastered: usize,
    pub batch_len: usize,
    pub batch_position: usize,
    pub questions_asked: u32,
    pub right_answers: u32,
    pub accuracy: f64,
    pub is_finished: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Quiz progress through a single dictionary.
pub struct QuizSession {
    dictionary: Arc<Dictionary>,
    correct: Vec<bool>,
    batch: Vec<usize>,
    cursor: usize,
    questions_asked: u32,
    right_answers: u32,
    finished: bool,
    last_correct_answer: Option<String>,
    rng: StdRng,
}

impl QuizSession {
    /// Start a fresh session: nothing answered, first batch is a random
    /// permutation of every entry.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyDictionary` if the dictionary has no entries.
    pub fn new(dictionary: Arc<Dictionary>) -> Result<Self, QuizError> {
        Self::with_rng(dictionary, StdRng::from_rng(&mut rand::rng()))
    }

    /// Same as [`QuizSession::new`] with a deterministic shuffle.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyDictionary` if the dictionary has no entries.
    pub fn seeded(dictionary: Arc<Dictionary>, seed: u64) -> Result<Self, QuizError> {
        Self::with_rng(dictionary, StdRng::seed_from_u64(seed))
    }

    fn with_rng(dictionary: Arc<Dictionary>, mut rng: StdRng) -> Result<Self, QuizError> {
        let total = dictionary.len();
        if total == 0 {
            return Err(QuizError::EmptyDictionary);
        }

        let mut batch: Vec<usize> = (0..total).collect();
        batch.shuffle(&mut rng);

        Ok(Self {
            dictionary,
            correct: vec![false; total],
            batch,
            cursor: 0,
            questions_asked: 0,
            right_answers: 0,
            finished: false,
            last_correct_answer: None,
            rng,
        })
    }

    /// Rehydrate a session from persisted state.
    ///
    /// The result is never finished, even if every flag is set; completion is
    /// only decided by the rollover after the next answer.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidPersistedState` if the state does not fit the
    /// dictionary (flag count, index range, cursor position or counters).
    pub fn from_persisted(
        dictionary: Arc<Dictionary>,
        batch: Vec<usize>,
        cursor: usize,
        correct: Vec<bool>,
        questions_asked: u32,
        right_answers: u32,
    ) -> Result<Self, QuizError> {
        let total = dictionary.len();
        if total == 0 {
            return Err(QuizError::EmptyDictionary);
        }
        if correct.len() != total {
            return Err(QuizError::InvalidPersistedState(format!(
                "{} flags for {total} entries",
                correct.len()
            )));
        }
        if let Some(bad) = batch.iter().find(|&&index| index >= total) {
            return Err(QuizError::InvalidPersistedState(format!(
                "batch index {bad} out of range for {total} entries"
            )));
        }
        // An exhausted batch only exists on a finished session, which is never saved.
        if cursor >= batch.len() {
            return Err(QuizError::InvalidPersistedState(format!(
                "cursor {cursor} past batch of {}",
                batch.len()
            )));
        }
        if right_answers > questions_asked {
            return Err(QuizError::InvalidPersistedState(format!(
                "{right_answers} right answers out of {questions_asked} asked"
            )));
        }

        Ok(Self {
            dictionary,
            correct,
            batch,
            cursor,
            questions_asked,
            right_answers,
            finished: false,
            last_correct_answer: None,
            rng: StdRng::from_rng(&mut rand::rng()),
        })
    }

    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    #[must_use]
    pub fn batch(&self) -> &[usize] {
        &self.batch
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn correct_flags(&self) -> &[bool] {
        &self.correct
    }

    #[must_use]
    pub fn questions_asked(&self) -> u32 {
        self.questions_asked
    }

    #[must_use]
    pub fn right_answers(&self) -> u32 {
        self.right_answers
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Correct answer of the most recently missed question.
    #[must_use]
    pub fn last_correct_answer(&self) -> Option<&str> {
        self.last_correct_answer.as_deref()
    }

    /// Fraction of answers that were correct. A session with no answers
    /// reports `1.0`; do not read that as completion.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.questions_asked == 0 {
            return 1.0;
        }
        f64::from(self.right_answers) / f64::from(self.questions_asked)
    }

    #[must_use]
    pub fn current_entry(&self) -> Option<&Entry> {
        if self.finished {
            return None;
        }
        self.batch
            .get(self.cursor)
            .and_then(|&index| self.dictionary.entry(index))
    }

    /// Question to ask next, or an empty string once finished.
    ///
    /// Returns the same value until the next [`QuizSession::submit_answer`].
    #[must_use]
    pub fn next_question(&self) -> &str {
        self.current_entry().map_or("", Entry::question)
    }

    /// Score `answer` against the current entry and advance.
    ///
    /// Comparison is exact: case-sensitive, no trimming.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Finished` if the session has already finished.
    pub fn submit_answer(&mut self, answer: &str) -> Result<bool, QuizError> {
        if self.finished {
            return Err(QuizError::Finished);
        }
        let index = *self.batch.get(self.cursor).ok_or(QuizError::Finished)?;
        let expected = self
            .dictionary
            .entry(index)
            .map(Entry::answer)
            .ok_or(QuizError::Finished)?;

        self.questions_asked = self.questions_asked.saturating_add(1);
        let is_correct = expected == answer;
        if is_correct {
            self.right_answers = self.right_answers.saturating_add(1);
        } else {
            self.last_correct_answer = Some(expected.to_owned());
        }
        self.correct[index] = is_correct;

        self.cursor += 1;
        if self.cursor == self.batch.len() {
            self.roll_over();
        }

        Ok(is_correct)
    }

    #[must_use]
    pub fn progress(&self) -> QuizProgress {
        QuizProgress {
            total: self.correct.len(),
            mastered: self.correct.iter().filter(|&&c| c).count(),
            batch_len: self.batch.len(),
            batch_position: self.cursor,
            questions_asked: self.questions_asked,
            right_answers: self.right_answers,
            accuracy: self.accuracy(),
            is_finished: self.finished,
        }
    }

    fn roll_over(&mut self) {
        let (wrong, mut right): (Vec<usize>, Vec<usize>) =
            (0..self.correct.len()).partition(|&index| !self.correct[index]);

        if wrong.is_empty() {
            self.finished = true;
            return;
        }

        let extra = extra_count(wrong.len(), self.correct.len()).min(right.len());
        right.shuffle(&mut self.rng);

        let mut next = wrong;
        next.extend(right.into_iter().take(extra));
        next.shuffle(&mut self.rng);

        self.batch = next;
        self.cursor = 0;
    }
}

/// Number of already-correct entries mixed into the next batch.
#[must_use]
pub fn extra_count(wrong: usize, total: usize) -> usize {
    wrong.saturating_mul(total).isqrt().saturating_sub(wrong)
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("dictionary", &self.dictionary.identifier())
            .field("batch_len", &self.batch.len())
            .field("cursor", &self.cursor)
            .field("questions_asked", &self.questions_asked)
            .field("right_answers", &self.right_answers)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;
    use crate::time::fixed_now;

    fn build_dictionary(size: usize) -> Arc<Dictionary> {
        let entries = (0..size)
            .map(|i| Entry::new(format!("q{i}"), format!("a{i}")))
            .collect();
        Arc::new(
            Dictionary::new("test", "Test", "tester", fixed_now(), Version::new(1), entries)
                .unwrap(),
        )
    }

    fn current_answer(session: &QuizSession) -> String {
        session.current_entry().unwrap().answer().to_owned()
    }

    fn current_index(session: &QuizSession) -> usize {
        session.batch()[session.cursor()]
    }

    #[test]
    fn first_batch_is_a_permutation() {
        for seed in 0..20 {
            let session = QuizSession::seeded(build_dictionary(9), seed).unwrap();
            let mut batch = session.batch().to_vec();
            batch.sort_unstable();
            assert_eq!(batch, (0..9).collect::<Vec<_>>());
            assert_eq!(session.cursor(), 0);
            assert!(session.correct_flags().iter().all(|&c| !c));
        }
    }

    #[test]
    fn empty_dictionary_is_rejected() {
        let err = QuizSession::new(build_dictionary(0)).unwrap_err();
        assert_eq!(err, QuizError::EmptyDictionary);
    }

    #[test]
    fn next_question_is_stable_until_answered() {
        let mut session = QuizSession::seeded(build_dictionary(4), 7).unwrap();
        let first = session.next_question().to_owned();
        assert_eq!(session.next_question(), first);

        let answer = current_answer(&session);
        session.submit_answer(&answer).unwrap();
        assert_ne!(session.next_question(), first);
    }

    #[test]
    fn comparison_is_exact() {
        let mut session = QuizSession::seeded(build_dictionary(3), 1).unwrap();
        let answer = current_answer(&session);

        assert!(!session.submit_answer(&answer.to_uppercase()).unwrap());
        assert_eq!(session.last_correct_answer(), Some(answer.as_str()));

        let answer = current_answer(&session);
        assert!(!session.submit_answer(&format!(" {answer}")).unwrap());

        let answer = current_answer(&session);
        assert!(session.submit_answer(&answer).unwrap());
        assert_eq!(session.questions_asked(), 3);
        assert_eq!(session.right_answers(), 1);
    }

    #[test]
    fn miss_records_answer_and_clears_flag() {
        let mut session = QuizSession::seeded(build_dictionary(2), 3).unwrap();
        let index = current_index(&session);
        session.submit_answer("nope").unwrap();
        assert!(!session.correct_flags()[index]);
        assert_eq!(session.last_correct_answer(), Some(format!("a{index}").as_str()));
    }

    #[test]
    fn all_correct_round_finishes() {
        let mut session = QuizSession::seeded(build_dictionary(5), 11).unwrap();
        for _ in 0..5 {
            let answer = current_answer(&session);
            assert!(session.submit_answer(&answer).unwrap());
        }
        assert!(session.is_finished());
        assert_eq!(session.next_question(), "");
        assert_eq!(session.submit_answer("a0"), Err(QuizError::Finished));
        assert!((session.accuracy() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rollover_mixes_wrong_and_extra_entries() {
        let mut session = QuizSession::seeded(build_dictionary(12), 5).unwrap();
        let mut missed = Vec::new();
        for _ in 0..12 {
            let index = current_index(&session);
            if missed.len() < 3 {
                missed.push(index);
                session.submit_answer("wrong").unwrap();
            } else {
                let answer = current_answer(&session);
                session.submit_answer(&answer).unwrap();
            }
        }

        assert!(!session.is_finished());
        assert_eq!(session.cursor(), 0);
        assert_eq!(session.batch().len(), 6);
        for index in &missed {
            assert!(session.batch().contains(index));
        }
        let mut unique = session.batch().to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn extra_count_matches_formula() {
        assert_eq!(extra_count(3, 12), 3);
        assert_eq!(extra_count(12, 12), 0);
        assert_eq!(extra_count(1, 100), 9);
        assert_eq!(extra_count(1, 1), 0);
        assert_eq!(extra_count(2, 3), 0);
    }

    #[test]
    fn converges_when_each_entry_is_missed_once() {
        let size = 10;
        let mut session = QuizSession::seeded(build_dictionary(size), 99).unwrap();
        let mut seen = vec![false; size];
        let mut rounds = 1;

        while !session.is_finished() {
            let index = current_index(&session);
            if seen[index] {
                let answer = current_answer(&session);
                session.submit_answer(&answer).unwrap();
            } else {
                seen[index] = true;
                session.submit_answer("miss").unwrap();
            }
            if !session.is_finished() && session.cursor() == 0 {
                rounds += 1;
            }
            assert!(rounds <= size, "took more than {size} rounds");
        }
        assert_eq!(rounds, 2);
    }

    #[test]
    fn accuracy_is_ratio_of_answers() {
        let mut session = QuizSession::seeded(build_dictionary(8), 2).unwrap();
        assert!((session.accuracy() - 1.0).abs() < f64::EPSILON);

        for i in 0..4 {
            if i == 0 {
                session.submit_answer("x").unwrap();
            } else {
                let answer = current_answer(&session);
                session.submit_answer(&answer).unwrap();
            }
        }
        assert!((session.accuracy() - 0.75).abs() < f64::EPSILON);
        let progress = session.progress();
        assert_eq!(progress.questions_asked, 4);
        assert_eq!(progress.mastered, 3);
        assert_eq!(progress.batch_position, 4);
    }

    #[test]
    fn restored_session_is_never_finished() {
        let dic = build_dictionary(3);
        let mut session =
            QuizSession::from_persisted(Arc::clone(&dic), vec![2, 0, 1], 2, vec![true; 3], 2, 2)
                .unwrap();
        assert!(!session.is_finished());
        assert_eq!(session.next_question(), "q1");

        assert!(session.submit_answer("a1").unwrap());
        assert!(session.is_finished());
    }

    #[test]
    fn restore_validates_shape() {
        let dic = build_dictionary(3);
        let bad_flags =
            QuizSession::from_persisted(Arc::clone(&dic), vec![0], 0, vec![false; 2], 0, 0);
        assert!(matches!(bad_flags, Err(QuizError::InvalidPersistedState(_))));

        let bad_index =
            QuizSession::from_persisted(Arc::clone(&dic), vec![3], 0, vec![false; 3], 0, 0);
        assert!(matches!(bad_index, Err(QuizError::InvalidPersistedState(_))));

        let bad_cursor =
            QuizSession::from_persisted(Arc::clone(&dic), vec![0, 1], 2, vec![false; 3], 0, 0);
        assert!(matches!(bad_cursor, Err(QuizError::InvalidPersistedState(_))));

        let bad_counts =
            QuizSession::from_persisted(dic, vec![0], 0, vec![false; 3], 1, 2);
        assert!(matches!(bad_counts, Err(QuizError::InvalidPersistedState(_))));
    }
}
