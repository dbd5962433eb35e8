//! A participant's cards and server-held marks.

use std::collections::BTreeSet;

use bingo_game::{Card, DrawSequencer, MAX_NUMBER, MarkMask, WinLine, evaluate};
use bingo_protocol::{CardId, CardView, ParticipantStatus, RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RoomError;
use crate::store::ParticipantRecord;

/// One user's seat in one room.
#[derive(Debug, Clone)]
pub(crate) struct Participant {
    pub(crate) user: UserId,
    cards: Vec<(CardId, Card)>,
    marked: Vec<BTreeSet<u8>>,
    pub(crate) status: ParticipantStatus,
    joined_at: DateTime<Utc>,
}

impl Participant {
    pub(crate) fn new(user: UserId, cards: Vec<(CardId, Card)>) -> Self {
        let marked = vec![BTreeSet::new(); cards.len()];
        Self {
            user,
            cards,
            marked,
            status: ParticipantStatus::Playing,
            joined_at: Utc::now(),
        }
    }

    /// Rebuilds a participant from its stored record and card bodies.
    pub(crate) fn restore(record: &ParticipantRecord, cards: Vec<(CardId, Card)>) -> Self {
        let mut marked = record.marked.clone();
        marked.resize(cards.len(), BTreeSet::new());
        Self {
            user: record.user_id,
            cards,
            marked,
            status: record.status,
            joined_at: record.joined_at,
        }
    }

    /// Marks `number` on card `index`.
    ///
    /// Returns `Ok(false)` if it was already marked.
    pub(crate) fn mark(
        &mut self,
        index: usize,
        number: u8,
        draw: &DrawSequencer,
    ) -> Result<bool, RoomError> {
        if self.status.is_terminal() {
            return Err(RoomError::ParticipantFinished {
                user: self.user,
                status: self.status,
            });
        }
        let (_, card) = self.card(index)?;
        if number == 0 || number > MAX_NUMBER {
            return Err(RoomError::InvalidNumber(number));
        }
        if !draw.is_drawn(number) {
            return Err(RoomError::NumberNotDrawn(number));
        }
        if !card.contains(number) {
            return Err(RoomError::NumberNotOnCard(number));
        }
        Ok(self.marked[index].insert(number))
    }

    /// Evaluates card `index` against the server-held marks.
    pub(crate) fn evaluate(&self, index: usize) -> Result<Option<WinLine>, RoomError> {
        let (_, card) = self.card(index)?;
        let mask = MarkMask::from_marked(card, &self.marked[index]);
        Ok(evaluate(card, &mask))
    }

    pub(crate) fn card_ids(&self) -> Vec<CardId> {
        self.cards.iter().map(|(id, _)| *id).collect()
    }

    pub(crate) fn record(&self, room_id: RoomId) -> ParticipantRecord {
        ParticipantRecord {
            room_id,
            user_id: self.user,
            card_ids: self.card_ids(),
            marked: self.marked.clone(),
            status: self.status,
            joined_at: self.joined_at,
        }
    }

    pub(crate) fn view(&self) -> ParticipantView {
        ParticipantView {
            user_id: self.user,
            cards: self
                .cards
                .iter()
                .map(|(card_id, card)| CardView {
                    card_id: *card_id,
                    numbers: *card,
                })
                .collect(),
            marked: self.marked.clone(),
            status: self.status,
            joined_at: self.joined_at,
        }
    }

    fn card(&self, index: usize) -> Result<&(CardId, Card), RoomError> {
        self.cards.get(index).ok_or(RoomError::CardIndexOutOfRange {
            index,
            cards: self.cards.len(),
        })
    }
}

/// What a participant looks like from outside the room actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub user_id: UserId,
    pub cards: Vec<CardView>,
    pub marked: Vec<BTreeSet<u8>>,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
}
