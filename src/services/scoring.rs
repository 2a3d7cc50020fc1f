// src/services/scoring.rs

//! Scoring engine: pure, deterministic grading of submitted answers against the
//! canonical question set.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::models::{attempt::AnswerMap, question::Question};

/// Correct/total tally for one domain within a single scoring pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DomainTally {
    pub correct: i64,
    pub total: i64,
}

/// Result of scoring one answer map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreOutcome {
    pub total_correct: i64,
    /// Only domains with at least one answered question appear here.
    pub per_domain: BTreeMap<String, DomainTally>,
}

/// Grades every canonical question that has an entry in `answers`.
///
/// * Entries for question ids outside `questions` are ignored.
/// * Questions without an entry are unanswered: they count toward no denominator.
pub fn score_questions(questions: &[Question], answers: &AnswerMap) -> ScoreOutcome {
    let mut outcome = ScoreOutcome::default();

    for question in questions {
        let Some(submitted) = answers.get(&question.id) else {
            continue;
        };

        let tally = outcome
            .per_domain
            .entry(question.domain.clone())
            .or_default();
        tally.total += 1;

        if is_correct(submitted, &question.correct_answers) {
            tally.correct += 1;
            outcome.total_correct += 1;
        }
    }

    outcome
}

/// Multiset equality: order is irrelevant, duplicates are significant.
pub fn is_correct(submitted: &[String], correct: &[String]) -> bool {
    if submitted.len() != correct.len() {
        return false;
    }
    count_values(submitted) == count_values(correct)
}

fn count_values(values: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::with_capacity(values.len());
    for value in values {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{AnswerOption, QuestionKind};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn question(id: &str, correct: &[&str], domain: &str) -> Question {
        Question {
            id: id.to_string(),
            exam_id: "pcd".to_string(),
            exam_set_id: "set1".to_string(),
            kind: if correct.len() == 1 {
                QuestionKind::SingleAnswer
            } else {
                QuestionKind::MultiAnswer
            },
            options: ["a", "b", "c", "d"]
                .iter()
                .map(|o| AnswerOption {
                    id: o.to_string(),
                    text: o.to_uppercase(),
                })
                .collect(),
            correct_answers: strings(correct),
            domain: domain.to_string(),
        }
    }

    fn answers(entries: &[(&str, &[&str])]) -> AnswerMap {
        entries
            .iter()
            .map(|(q, opts)| (q.to_string(), strings(opts)))
            .collect()
    }

    #[test]
    fn test_is_correct_ignores_order() {
        assert!(is_correct(&strings(&["x", "y"]), &strings(&["y", "x"])));
        assert!(is_correct(&strings(&["1", "2", "3"]), &strings(&["2", "3", "1"])));
        assert!(is_correct(&strings(&["a", "a", "b"]), &strings(&["a", "b", "a"])));
    }

    #[test]
    fn test_is_correct_counts_duplicates() {
        assert!(!is_correct(&strings(&["x", "x"]), &strings(&["x", "y"])));
        assert!(!is_correct(&strings(&["a", "a", "b"]), &strings(&["a", "b", "b"])));
    }

    #[test]
    fn test_is_correct_size_and_membership() {
        assert!(!is_correct(&strings(&["a"]), &strings(&["a", "b"])));
        assert!(!is_correct(&strings(&["a", "b"]), &strings(&["c", "d"])));
        assert!(!is_correct(&strings(&[]), &strings(&["a"])));
        assert!(is_correct(&strings(&[]), &strings(&[])));
    }

    #[test]
    fn test_score_mixed_kinds() {
        let questions = vec![
            question("q1", &["a"], "Compute"),
            question("q2", &["b", "c"], "Security"),
        ];
        let outcome = score_questions(&questions, &answers(&[("q1", &["a"]), ("q2", &["c", "b"])]));

        assert_eq!(outcome.total_correct, 2);
        assert_eq!(outcome.per_domain["Compute"], DomainTally { correct: 1, total: 1 });
        assert_eq!(outcome.per_domain["Security"], DomainTally { correct: 1, total: 1 });
    }

    #[test]
    fn test_unanswered_questions_are_not_counted() {
        let questions = vec![
            question("q1", &["a"], "Compute"),
            question("q2", &["b"], "Compute"),
            question("q3", &["c"], "Compute"),
        ];
        let outcome = score_questions(&questions, &answers(&[("q1", &["a"]), ("q2", &["a"])]));

        assert_eq!(outcome.total_correct, 1);
        assert_eq!(outcome.per_domain["Compute"], DomainTally { correct: 1, total: 2 });
    }

    #[test]
    fn test_unknown_question_ids_are_ignored() {
        let questions = vec![question("q1", &["a"], "Compute")];
        let outcome = score_questions(
            &questions,
            &answers(&[("q1", &["a"]), ("ghost", &["a"])]),
        );

        assert_eq!(outcome.total_correct, 1);
        assert_eq!(outcome.per_domain.len(), 1);
        assert_eq!(outcome.per_domain["Compute"].total, 1);
    }

    #[test]
    fn test_empty_answers_score_nothing() {
        let questions = vec![question("q1", &["a"], "Compute")];
        let outcome = score_questions(&questions, &AnswerMap::new());

        assert_eq!(outcome, ScoreOutcome::default());
    }
}
