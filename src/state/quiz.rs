//! Immutable quiz snapshot held by a room for the lifetime of a game.

use std::collections::HashSet;

use rand::seq::IndexedRandom;

use crate::{
    config::BONUS_ROUND_FRACTION,
    dto::{
        common::QuestionProjection,
        game::{QuestionInput, QuizInput},
        ws::{QuestionDetail, QuizDetail},
    },
};

/// One question of a quiz snapshot.
#[derive(Debug, Clone)]
pub struct Question {
    /// Stable id within the quiz.
    pub id: u32,
    /// Prompt text.
    pub text: String,
    /// Option list of length 2 or 4.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Optional background image reference.
    pub image_url: Option<String>,
}

/// Ordered, immutable view of the quiz a room plays through.
///
/// Bonus questions are picked once at snapshot time and stay stable for the
/// whole game; roughly 30% of questions, never the first or the last, and
/// none at all for quizzes shorter than four questions.
#[derive(Debug, Clone)]
pub struct QuizSnapshot {
    title: String,
    questions: Vec<Question>,
    bonus_questions: HashSet<usize>,
}

impl QuizSnapshot {
    /// Build a snapshot, selecting bonus questions at random.
    pub fn new(title: String, questions: Vec<Question>) -> Self {
        let bonus_questions = select_bonus_questions(questions.len());
        Self::with_bonus(title, questions, bonus_questions)
    }

    /// Build a snapshot with an explicit bonus selection.
    pub fn with_bonus(
        title: String,
        questions: Vec<Question>,
        bonus_questions: HashSet<usize>,
    ) -> Self {
        Self {
            title,
            questions,
            bonus_questions,
        }
    }

    /// Quiz display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the snapshot holds no questions.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Question at a zero-based index.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Whether the question at `index` pays double base points.
    pub fn is_bonus(&self, index: usize) -> bool {
        self.bonus_questions.contains(&index)
    }

    /// Player/spectator projection of the question at `index`: no correct
    /// option index.
    pub fn projection(&self, index: usize) -> Option<QuestionProjection> {
        self.question(index).map(|q| QuestionProjection {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
            image_url: q.image_url.clone(),
        })
    }

    /// Organizer view of the whole quiz, correct indices included.
    pub fn detail(&self) -> QuizDetail {
        QuizDetail {
            quiz_title: self.title.clone(),
            questions: self
                .questions
                .iter()
                .enumerate()
                .map(|(index, q)| QuestionDetail {
                    id: q.id,
                    text: q.text.clone(),
                    options: q.options.clone(),
                    answer_index: q.correct_index,
                    is_bonus: self.is_bonus(index),
                    image_url: q.image_url.clone(),
                })
                .collect(),
        }
    }
}

impl From<QuizInput> for QuizSnapshot {
    fn from(input: QuizInput) -> Self {
        let questions = input.questions.into_iter().map(Question::from).collect();
        Self::new(input.quiz_title, questions)
    }
}

impl From<QuestionInput> for Question {
    fn from(input: QuestionInput) -> Self {
        Self {
            id: input.id,
            text: input.text,
            options: input.options,
            correct_index: input.answer_index,
            image_url: input.image_url,
        }
    }
}

/// Pick bonus question indices for a quiz of `count` questions.
fn select_bonus_questions(count: usize) -> HashSet<usize> {
    if count < 4 {
        return HashSet::new();
    }
    let candidates: Vec<usize> = (1..count - 1).collect();
    let wanted = ((count as f64 * BONUS_ROUND_FRACTION) as usize).max(1);
    let mut rng = rand::rng();
    candidates
        .choose_multiple(&mut rng, wanted.min(candidates.len()))
        .copied()
        .collect()
}
