//! Self-play records and their expansion into training examples
//!
//! Records arrive one JSON object per line:
//! `{"result": 1, "action": [[move, [[action, prob], ...]], ...]}`
//! where `result` is the outcome for the player who moved first.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::TrainingExample;
use crate::{value_flips_after, ActionId, GameCodec, PipelineError, Result, VisitShare};

/// Lines shorter than this (newline included) mark the end of the record stream.
const MIN_RECORD_LINE_LEN: usize = 5;

/// One recorded ply: the move played and the search's sparse visit distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlyRecord(pub ActionId, pub Vec<VisitShare>);

impl PlyRecord {
    pub fn action(&self) -> ActionId {
        self.0
    }

    pub fn visits(&self) -> &[VisitShare] {
        &self.1
    }
}

/// A finished self-play game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelfPlayRecord {
    /// -1, 0 or 1 from the first mover's perspective.
    #[serde(deserialize_with = "game_result")]
    pub result: i8,

    pub action: Vec<PlyRecord>,
}

fn game_result<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i8, D::Error> {
    let result = i8::deserialize(deserializer)?;
    if (-1..=1).contains(&result) {
        Ok(result)
    } else {
        Err(D::Error::custom(format!("game result must be -1, 0 or 1, got {result}")))
    }
}

/// Expand sparse visit shares into a dense vector over the action table.
///
/// Entries not listed are exactly zero. A repeated index keeps its last share.
pub fn dense_policy(visits: &[VisitShare], action_count: usize) -> Result<Vec<f32>> {
    let mut dense = vec![0.0f32; action_count];
    for &(index, prob) in visits {
        let slot = dense.get_mut(index).ok_or(PipelineError::ActionOutOfRange {
            index,
            size: action_count,
        })?;
        *slot = prob;
    }
    Ok(dense)
}

/// Replay a record from the initial position, producing one example per ply.
///
/// The running value starts at `-result`: the record scores the game for the
/// first mover, while the first example is the position that mover faces. After
/// each ply the sign flips unless the codec marks that ply as the second-mover
/// slot.
pub fn expand_record<G: GameCodec + ?Sized>(
    codec: &G,
    record: &SelfPlayRecord,
) -> Result<Vec<TrainingExample<G::State>>> {
    let action_count = codec.action_count();
    let mut state = codec.initial_state();
    let mut value = -f32::from(record.result);
    let mut examples = Vec::with_capacity(record.action.len());

    for (ply, step) in record.action.iter().enumerate() {
        let policy = dense_policy(step.visits(), action_count)?;
        let next = codec.apply_move(&state, step.action(), ply)?;
        examples.push(TrainingExample {
            state,
            ply,
            policy,
            value,
        });
        state = next.state;
        if value_flips_after(codec, ply) {
            value = -value;
        }
    }

    Ok(examples)
}

/// Lazily decoded stream of self-play records.
///
/// End of input, or a line too short to hold a record, ends the stream; that is
/// normal termination, not an error.
pub struct RecordStream<R> {
    reader: R,
    line: String,
    finished: bool,
    records_read: usize,
}

impl RecordStream<BufReader<File>> {
    /// Open a record file. Opening again restarts from the first record.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            finished: false,
            records_read: 0,
        }
    }

    /// Number of records decoded so far.
    pub fn records_read(&self) -> usize {
        self.records_read
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<SelfPlayRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
            Ok(_) if self.line.len() < MIN_RECORD_LINE_LEN => {
                self.finished = true;
                None
            }
            Ok(_) => {
                self.records_read += 1;
                Some(serde_json::from_str(self.line.trim_end()).map_err(PipelineError::from))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCodec;
    use std::io::Cursor;

    fn record(result: i8, plies: usize) -> SelfPlayRecord {
        SelfPlayRecord {
            result,
            action: (0..plies)
                .map(|ply| PlyRecord(ply % 3, vec![(ply % 3, 0.75), (3, 0.25)]))
                .collect(),
        }
    }

    #[test]
    fn test_dense_policy_copies_listed_entries_only() {
        let dense = dense_policy(&[(1, 0.25), (4, 0.5), (0, 0.125)], 6).unwrap();
        assert_eq!(dense, vec![0.125, 0.25, 0.0, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_dense_policy_empty_is_all_zero() {
        assert_eq!(dense_policy(&[], 3).unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn test_dense_policy_rejects_out_of_range_index() {
        let err = dense_policy(&[(6, 1.0)], 6).unwrap_err();
        assert!(matches!(err, PipelineError::ActionOutOfRange { index: 6, size: 6 }));
    }

    #[test]
    fn test_expand_record_one_example_per_ply() {
        let codec = FakeCodec::new(4, 20);
        let examples = expand_record(&codec, &record(1, 7)).unwrap();

        assert_eq!(examples.len(), 7);
        for (ply, ex) in examples.iter().enumerate() {
            assert_eq!(ex.ply, ply);
            assert_eq!(ex.policy.len(), 4);
            // state before ply n has exactly n moves applied
            assert_eq!(ex.state.len(), ply);
        }
    }

    #[test]
    fn test_expand_record_value_signs_follow_second_mover_rule() {
        let codec = FakeCodec::new(4, 20);
        let values: Vec<f32> = expand_record(&codec, &record(1, 6))
            .unwrap()
            .iter()
            .map(|ex| ex.value)
            .collect();

        // first value is -result, no flip after ply 1
        assert_eq!(values, vec![-1.0, 1.0, 1.0, -1.0, 1.0, -1.0]);
        assert_ne!(values, vec![-1.0, 1.0, -1.0, 1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_expand_record_negative_result() {
        let codec = FakeCodec::new(4, 20);
        let examples = expand_record(&codec, &record(-1, 3)).unwrap();
        assert_eq!(examples[0].value, 1.0);
        assert_eq!(examples[1].value, -1.0);
        assert_eq!(examples[2].value, -1.0);
    }

    #[test]
    fn test_expand_record_draw_is_zero_everywhere() {
        let codec = FakeCodec::new(4, 20);
        for ex in expand_record(&codec, &record(0, 5)).unwrap() {
            assert_eq!(ex.value, 0.0);
        }
    }

    #[test]
    fn test_record_stream_decodes_lines_and_stops_at_eof() {
        let input = concat!(
            r#"{"result": 1, "action": [[2, [[2, 0.5], [1, 0.5]]], [0, [[0, 1.0]]]]}"#,
            "\n",
            r#"{"result": -1, "action": []}"#,
            "\n",
        );
        let mut stream = RecordStream::new(Cursor::new(input));

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.result, 1);
        assert_eq!(first.action[0], PlyRecord(2, vec![(2, 0.5), (1, 0.5)]));
        assert_eq!(first.action[1].visits(), &[(0, 1.0)]);

        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.result, -1);
        assert!(second.action.is_empty());

        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
        assert_eq!(stream.records_read(), 2);
    }

    #[test]
    fn test_record_stream_short_line_terminates() {
        let input = concat!(r#"{"result": 0, "action": []}"#, "\n", "\n", r#"{"result": 1, "action": []}"#);
        let records: Vec<_> = RecordStream::new(Cursor::new(input)).collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_record_stream_malformed_line_is_error() {
        let input = "{\"result\": \"oops\"}\n";
        let mut stream = RecordStream::new(Cursor::new(input));
        assert!(matches!(stream.next(), Some(Err(PipelineError::Record(_)))));
    }

    #[test]
    fn test_record_with_out_of_range_result_is_rejected() {
        let input = concat!(r#"{"result": 5, "action": []}"#, "\n");
        let mut stream = RecordStream::new(Cursor::new(input));
        assert!(matches!(stream.next(), Some(Err(PipelineError::Record(_)))));

        let draw: SelfPlayRecord = serde_json::from_str(r#"{"result": 0, "action": []}"#).unwrap();
        assert_eq!(draw.result, 0);
    }
}
