//! Integration tests for the room system: full games against the
//! in-memory wallet and store, with Tokio's paused clock.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bingo_game::{Card, MarkMask, evaluate};
use bingo_hub::{BroadcastHub, Outbound, Outlet};
use bingo_protocol::{
    Amount, CardId, ParticipantStatus, RoomId, RoomStatus, ServerMessage, UserId, VoidReason,
};
use bingo_room::{
    ErrorKind, MemoryStore, MemoryWallet, Outcome, RoomConfig, RoomError, RoomHandle,
    RoomManager, RoomSettings, RoomStore, TxnId, Wallet, WalletError,
};
use bingo_transport::ConnectionId;
use tokio::sync::mpsc;

// =========================================================================
// Fixtures
// =========================================================================

fn config() -> RoomConfig {
    RoomConfig {
        call_interval: Duration::from_secs(1),
        start_delay: Duration::from_secs(2),
        draw_seed: Some(7),
        ..RoomConfig::default()
    }
}

struct Hall {
    manager: Arc<RoomManager>,
    hub: Arc<BroadcastHub>,
    store: Arc<MemoryStore>,
}

fn hall_with(config: RoomConfig, wallet: Arc<dyn Wallet>, store: Arc<MemoryStore>) -> Hall {
    let hub = Arc::new(BroadcastHub::new());
    let manager = Arc::new(RoomManager::new(config, hub.clone(), wallet, store.clone()));
    Hall {
        manager,
        hub,
        store,
    }
}

async fn funded_wallet(users: &[u64], balance: Amount) -> Arc<MemoryWallet> {
    let wallet = Arc::new(MemoryWallet::new());
    for &user in users {
        wallet.deposit(UserId(user), balance).await;
    }
    wallet
}

/// Registers a listening connection in `room` and returns its queue.
fn subscribe(hub: &BroadcastHub, room: RoomId, user: u64) -> mpsc::UnboundedReceiver<Outbound> {
    let (outlet, rx) = Outlet::channel(ConnectionId::new(user));
    hub.register(room, UserId(user), outlet);
    rx
}

/// A card whose I column holds 21..=25 and whose top row is
/// 1, 21, 31, 46, 61.
fn fixed_card() -> Card {
    Card::from_rows([
        [1, 21, 31, 46, 61],
        [2, 22, 32, 47, 62],
        [3, 23, 0, 48, 63],
        [4, 24, 34, 49, 64],
        [5, 25, 35, 50, 65],
    ])
    .unwrap()
}

async fn give_card(store: &MemoryStore, user: u64, card: Card) -> CardId {
    store.insert_cards(UserId(user), vec![card]).await.unwrap()[0].card_id
}

/// Waits for the next `NumberCalled`, skipping other events.
async fn next_call(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<u8> {
    while let Some(msg) = rx.recv().await {
        match msg.as_ref() {
            ServerMessage::NumberCalled { number, .. } => return Some(*number),
            ServerMessage::GameVoid { .. } | ServerMessage::PlayerWon { .. } => return None,
            _ => {}
        }
    }
    None
}

/// A wallet whose debits take `delay_ms` and whose credits take
/// `credit_delay_ms` before touching the ledger.
struct SlowWallet {
    inner: MemoryWallet,
    delay_ms: AtomicU64,
    credit_delay_ms: AtomicU64,
}

impl SlowWallet {
    fn new(inner: MemoryWallet, delay: Duration) -> Self {
        Self {
            inner,
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
            credit_delay_ms: AtomicU64::new(0),
        }
    }

    fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn set_credit_delay(&self, delay: Duration) {
        self.credit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Wallet for SlowWallet {
    async fn balance(&self, user: UserId) -> Result<Amount, WalletError> {
        self.inner.balance(user).await
    }

    async fn debit(&self, user: UserId, amount: Amount, txn: &TxnId) -> Result<(), WalletError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.debit(user, amount, txn).await
    }

    async fn credit(&self, user: UserId, amount: Amount, txn: &TxnId) -> Result<(), WalletError> {
        let delay = self.credit_delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.credit(user, amount, txn).await
    }
}

/// Starts a one-player game with [`fixed_card`] and marks calls until the
/// card holds a line. Returns once a claim would win.
async fn play_to_a_line(hall: &Hall, room: &RoomHandle, user: u64) {
    let card = fixed_card();
    let card_id = give_card(&hall.store, user, card).await;
    let mut events = subscribe(&hall.hub, room.room_id(), 99);
    room.join(UserId(user), vec![card_id]).await.unwrap();
    room.start().await.unwrap();

    let mut marked = BTreeSet::new();
    while let Some(number) = next_call(&mut events).await {
        if card.contains(number) {
            room.mark(UserId(user), 0, number).await.unwrap();
            marked.insert(number);
            if evaluate(&card, &MarkMask::from_marked(&card, &marked)).is_some() {
                return;
            }
        }
    }
    panic!("game ended before the card held a line");
}

// =========================================================================
// Full games
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unclaimed_game_calls_all_75_then_voids() {
    let wallet = funded_wallet(&[1, 2, 3, 4], 100).await;
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let room = hall.manager.create_room(RoomSettings::new("exhaust", 10));
    let mut events = subscribe(&hall.hub, room.room_id(), 99);

    for user in 1..=4 {
        let cards = hall.manager.generate_cards(UserId(user), 1).await.unwrap();
        room.join(UserId(user), vec![cards[0].card_id]).await.unwrap();
    }
    room.start().await.unwrap();

    let mut called = Vec::new();
    let mut void = None;
    while let Some(msg) = events.recv().await {
        match msg.as_ref() {
            ServerMessage::NumberCalled {
                number,
                total_called,
                ..
            } => {
                called.push(*number);
                assert_eq!(*total_called, called.len());
            }
            ServerMessage::GameVoid {
                reason,
                total_called,
            } => {
                void = Some((*reason, *total_called));
                break;
            }
            _ => {}
        }
    }

    assert_eq!(called.len(), 75);
    let distinct: BTreeSet<u8> = called.iter().copied().collect();
    assert_eq!(distinct, (1..=75).collect::<BTreeSet<u8>>());
    assert_eq!(void, Some((VoidReason::Exhausted, 75)));

    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.status, RoomStatus::Finished);
    assert_eq!(snapshot.called, called);
    assert_eq!(
        snapshot.outcome,
        Some(Outcome::Void {
            reason: VoidReason::Exhausted
        })
    );
    for user in 1..=4 {
        assert_eq!(wallet.balance(UserId(user)).await.unwrap(), 90);
        let view = room.participant(UserId(user)).await.unwrap().unwrap();
        assert_eq!(view.status, ParticipantStatus::Lost);
    }
}

#[tokio::test(start_paused = true)]
async fn test_mark_requires_the_number_to_be_called() {
    let wallet = funded_wallet(&[1], 100).await;
    let hall = hall_with(config(), wallet, Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("marks", 10));
    let mut events = subscribe(&hall.hub, room.room_id(), 99);

    room.join(UserId(1), vec![card_id]).await.unwrap();

    let err = room.mark(UserId(1), 0, 23).await.unwrap_err();
    assert!(matches!(err, RoomError::NotActive { .. }));

    room.start().await.unwrap();
    let err = room.mark(UserId(1), 0, 23).await.unwrap_err();
    assert!(matches!(err, RoomError::NumberNotDrawn(23)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    while let Some(number) = next_call(&mut events).await {
        if number == 23 {
            break;
        }
    }
    assert!(room.mark(UserId(1), 0, 23).await.unwrap());
    assert!(!room.mark(UserId(1), 0, 23).await.unwrap());

    let view = room.participant(UserId(1)).await.unwrap().unwrap();
    assert_eq!(view.marked[0], BTreeSet::from([23]));
    assert!(matches!(
        room.mark(UserId(2), 0, 23).await,
        Err(RoomError::NotParticipant { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_first_call_comes_exactly_after_start_delay() {
    let wallet = funded_wallet(&[1], 100).await;
    let hall = hall_with(config(), wallet, Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("cadence", 10));
    let mut events = subscribe(&hall.hub, room.room_id(), 99);
    room.join(UserId(1), vec![card_id]).await.unwrap();

    let started_at = tokio::time::Instant::now();
    room.start().await.unwrap();
    assert!(next_call(&mut events).await.is_some());
    assert_eq!(started_at.elapsed(), Duration::from_secs(2));

    let before = tokio::time::Instant::now();
    assert!(next_call(&mut events).await.is_some());
    assert_eq!(before.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_claims_have_exactly_one_winner() {
    let wallet = funded_wallet(&[1, 2], 100).await;
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let card = fixed_card();
    let first = give_card(&hall.store, 1, card).await;
    let second = give_card(&hall.store, 2, card).await;
    let room = hall.manager.create_room(RoomSettings::new("race", 10));
    let mut events = subscribe(&hall.hub, room.room_id(), 99);

    room.join(UserId(1), vec![first]).await.unwrap();
    room.join(UserId(2), vec![second]).await.unwrap();

    // Not running yet.
    assert!(matches!(
        room.claim_win(UserId(1), 0).await,
        Err(RoomError::NotActive { .. })
    ));
    room.start().await.unwrap();

    let mut marked = BTreeSet::new();
    while let Some(number) = next_call(&mut events).await {
        if !card.contains(number) {
            continue;
        }
        room.mark(UserId(1), 0, number).await.unwrap();
        room.mark(UserId(2), 0, number).await.unwrap();
        marked.insert(number);
        if evaluate(&card, &MarkMask::from_marked(&card, &marked)).is_some() {
            break;
        }
        // A premature claim is answered without side effects.
        let early = room.claim_win(UserId(1), 0).await.unwrap();
        assert!(!early.has_won);
        assert_eq!(early.status, ParticipantStatus::Playing);
    }

    let (a, b) = tokio::join!(room.claim_win(UserId(1), 0), room.claim_win(UserId(2), 0));
    let results = [a, b];
    let winners: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter(|receipt| receipt.has_won)
        .collect();
    assert_eq!(winners.len(), 1);
    let receipt = winners[0];
    assert_eq!(receipt.winning_amount, Some(20));
    assert!(receipt.settled);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(RoomError::NotActive { status: RoomStatus::Finished, .. })))
    );

    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.status, RoomStatus::Finished);
    let Some(Outcome::Won { user, payout, .. }) = snapshot.outcome.clone() else {
        panic!("expected a winning outcome, got {:?}", snapshot.outcome);
    };
    assert_eq!(payout, 20);
    let loser = if user == UserId(1) { UserId(2) } else { UserId(1) };
    assert_eq!(wallet.balance(user).await.unwrap(), 110);
    assert_eq!(wallet.balance(loser).await.unwrap(), 90);
    assert!(wallet.is_applied(&TxnId::payout(snapshot.game_key)).await);
    assert_eq!(wallet.applied_count().await, 3);

    let won = room.participant(user).await.unwrap().unwrap();
    let lost = room.participant(loser).await.unwrap().unwrap();
    assert_eq!(won.status, ParticipantStatus::Won);
    assert_eq!(lost.status, ParticipantStatus::Lost);

    // The clock is disarmed: no more calls arrive.
    let called = snapshot.called.len();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(room.snapshot().await.unwrap().called.len(), called);
}

#[tokio::test(start_paused = true)]
async fn test_failed_payout_can_be_retried() {
    let wallet = funded_wallet(&[1], 100).await;
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let card = fixed_card();
    let card_id = give_card(&hall.store, 1, card).await;
    let room = hall.manager.create_room(RoomSettings::new("payout", 10));
    let room_id = room.room_id();
    let mut events = subscribe(&hall.hub, room_id, 99);

    room.join(UserId(1), vec![card_id]).await.unwrap();
    room.start().await.unwrap();

    let mut marked = BTreeSet::new();
    while let Some(number) = next_call(&mut events).await {
        if card.contains(number) {
            room.mark(UserId(1), 0, number).await.unwrap();
            marked.insert(number);
            if evaluate(&card, &MarkMask::from_marked(&card, &marked)).is_some() {
                break;
            }
        }
    }

    wallet.set_offline(true);
    let receipt = room.claim_win(UserId(1), 0).await.unwrap();
    assert!(receipt.has_won);
    assert!(!receipt.settled);
    assert_eq!(receipt.winning_amount, Some(10));

    wallet.set_offline(false);
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 90);
    hall.manager.retry_payout(room_id).await.unwrap();
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 100);
    assert!(matches!(
        room.snapshot().await.unwrap().outcome,
        Some(Outcome::Won { settled: true, .. })
    ));
    assert!(matches!(
        hall.manager.retry_payout(room_id).await,
        Err(RoomError::NothingToSettle(_))
    ));
}

// =========================================================================
// Joins
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_consumes_no_seat() {
    let wallet = Arc::new(MemoryWallet::new());
    wallet.deposit(UserId(1), 5).await;
    wallet.deposit(UserId(2), 100).await;
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let poor = give_card(&hall.store, 1, fixed_card()).await;
    let rich = give_card(&hall.store, 2, fixed_card()).await;
    let room = hall
        .manager
        .create_room(RoomSettings::new("one seat", 10).with_max_players(1));

    let err = room.join(UserId(1), vec![poor]).await.unwrap_err();
    assert!(matches!(
        err,
        RoomError::InsufficientFunds {
            needed: 10,
            available: 5
        }
    ));
    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.player_count, 0);
    assert_eq!(snapshot.pending_joins, 0);
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 5);

    let receipt = room.join(UserId(2), vec![rich]).await.unwrap();
    assert_eq!(receipt.player_count, 1);
    assert_eq!(receipt.card_ids, vec![rich]);

    let err = room.join(UserId(1), vec![poor]).await.unwrap_err();
    assert!(matches!(err, RoomError::RoomFull(_)));
}

#[tokio::test(start_paused = true)]
async fn test_join_rejects_bad_card_selections() {
    let wallet = funded_wallet(&[1, 2], 100).await;
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let mine = give_card(&hall.store, 1, fixed_card()).await;
    let theirs = give_card(&hall.store, 2, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("cards", 10));

    assert!(matches!(
        room.join(UserId(1), vec![]).await,
        Err(RoomError::InvalidCardSelection(_))
    ));
    assert!(matches!(
        room.join(UserId(1), vec![mine, mine]).await,
        Err(RoomError::InvalidCardSelection(_))
    ));
    assert!(matches!(
        room.join(UserId(1), vec![theirs]).await,
        Err(RoomError::CardNotOwned { .. })
    ));
    assert!(matches!(
        room.join(UserId(1), vec![CardId(999)]).await,
        Err(RoomError::UnknownCard(CardId(999)))
    ));

    // None of the rejects touched the wallet or held a seat.
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 100);
    assert_eq!(room.snapshot().await.unwrap().pending_joins, 0);

    room.join(UserId(1), vec![mine]).await.unwrap();
    assert!(matches!(
        room.join(UserId(1), vec![mine]).await,
        Err(RoomError::AlreadyJoined { .. })
    ));
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 90);
}

#[tokio::test(start_paused = true)]
async fn test_join_lapsed_by_start_is_refunded() {
    let inner = MemoryWallet::new();
    inner.deposit(UserId(1), 100).await;
    inner.deposit(UserId(2), 100).await;
    let wallet = Arc::new(SlowWallet::new(inner, Duration::ZERO));
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let early = give_card(&hall.store, 1, fixed_card()).await;
    let late = give_card(&hall.store, 2, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("lapse", 10));

    room.join(UserId(1), vec![early]).await.unwrap();

    wallet.set_delay(Duration::from_secs(2));
    let pending = tokio::spawn({
        let room = room.clone();
        async move { room.join(UserId(2), vec![late]).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(room.snapshot().await.unwrap().pending_joins, 1);

    room.start().await.unwrap();
    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.pending_joins, 0);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, RoomError::ReservationLapsed(_)));
    assert_eq!(wallet.balance(UserId(2)).await.unwrap(), 100);
    assert!(
        wallet
            .inner
            .is_applied(&TxnId::refund(snapshot.game_key, UserId(2), 0))
            .await
    );
    assert_eq!(room.snapshot().await.unwrap().player_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_debit_releases_seat_and_retry_reuses_txn() {
    let inner = MemoryWallet::new();
    inner.deposit(UserId(1), 100).await;
    let wallet = Arc::new(SlowWallet::new(inner, Duration::from_secs(30)));
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("timeout", 10));

    let err = room.join(UserId(1), vec![card_id]).await.unwrap_err();
    assert!(matches!(err, RoomError::WalletTimeout));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(room.snapshot().await.unwrap().pending_joins, 0);

    wallet.set_delay(Duration::ZERO);
    room.join(UserId(1), vec![card_id]).await.unwrap();
    let game_key = room.snapshot().await.unwrap().game_key;
    assert!(
        wallet
            .inner
            .is_applied(&TxnId::join(game_key, UserId(1), 0))
            .await
    );
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 90);
}

#[tokio::test(start_paused = true)]
async fn test_start_needs_participants_and_runs_once() {
    let wallet = funded_wallet(&[1, 2], 100).await;
    let hall = hall_with(config(), wallet, Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let other = give_card(&hall.store, 2, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("start", 10));

    assert!(matches!(room.start().await, Err(RoomError::NoParticipants(_))));
    room.join(UserId(1), vec![card_id]).await.unwrap();
    room.start().await.unwrap();
    assert_eq!(room.snapshot().await.unwrap().status, RoomStatus::Starting);
    assert!(matches!(room.start().await, Err(RoomError::CannotStart { .. })));
    assert!(matches!(
        room.join(UserId(2), vec![other]).await,
        Err(RoomError::NotJoinable { .. })
    ));

    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.status, RoomStatus::Running);
    assert!(!snapshot.called.is_empty());
}

// =========================================================================
// Lobby, teardown, and reaping
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_generate_cards_enforces_limits() {
    let hall = hall_with(config(), Arc::new(MemoryWallet::new()), Arc::new(MemoryStore::new()));

    let cards = hall.manager.generate_cards(UserId(1), 3).await.unwrap();
    assert_eq!(cards.len(), 3);
    assert_eq!(hall.manager.my_cards(UserId(1)).await.unwrap(), cards);
    assert!(hall.manager.my_cards(UserId(2)).await.unwrap().is_empty());

    assert!(matches!(
        hall.manager.generate_cards(UserId(1), 11).await,
        Err(RoomError::TooManyCards {
            requested: 11,
            max: 10
        })
    ));
    assert!(hall.manager.generate_cards(UserId(1), 0).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_list_rooms_shows_open_rooms_only() {
    let wallet = funded_wallet(&[1], 100).await;
    let hall = hall_with(config(), wallet, Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let open = hall.manager.create_room(RoomSettings::new("open", 5));
    let busy = hall.manager.create_room(RoomSettings::new("busy", 5));

    busy.join(UserId(1), vec![card_id]).await.unwrap();
    busy.start().await.unwrap();
    let listed: Vec<RoomId> = hall
        .manager
        .list_rooms()
        .await
        .iter()
        .map(|summary| summary.room_id)
        .collect();
    assert_eq!(listed, vec![open.room_id(), busy.room_id()]);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let listed = hall.manager.list_rooms().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "open");
}

#[tokio::test(start_paused = true)]
async fn test_list_rooms_skips_a_room_busy_paying_out() {
    let inner = MemoryWallet::new();
    inner.deposit(UserId(1), 100).await;
    let wallet = Arc::new(SlowWallet::new(inner, Duration::ZERO));
    let hall = hall_with(config(), wallet.clone(), Arc::new(MemoryStore::new()));
    let lobby = hall.manager.create_room(RoomSettings::new("lobby", 5));
    let busy = hall.manager.create_room(RoomSettings::new("busy", 10));
    play_to_a_line(&hall, &busy, 1).await;

    wallet.set_credit_delay(Duration::from_secs(4));
    let claim = tokio::spawn({
        let busy = busy.clone();
        async move { busy.claim_win(UserId(1), 0).await }
    });
    // Let the actor pick up the claim and start the credit.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let asked_at = tokio::time::Instant::now();
    let listed = hall.manager.list_rooms().await;
    assert!(asked_at.elapsed() < Duration::from_secs(1));
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].room_id, lobby.room_id());

    let receipt = claim.await.unwrap().unwrap();
    assert!(receipt.has_won);
    assert!(receipt.settled);
}

#[tokio::test(start_paused = true)]
async fn test_create_or_get_reserves_ids_for_create_room() {
    let hall = hall_with(config(), Arc::new(MemoryWallet::new()), Arc::new(MemoryStore::new()));
    let fixed = hall.manager.create_or_get(RoomId(3), RoomSettings::new("fixed", 5));
    let next = hall.manager.create_room(RoomSettings::new("next", 5));
    assert_eq!(next.room_id(), RoomId(4));

    let again = hall.manager.create_or_get(RoomId(3), RoomSettings::new("ignored", 1));
    assert_eq!(again.room_id(), fixed.room_id());
    assert_eq!(hall.manager.room_info(RoomId(3)).await.unwrap().name, "fixed");

    // The largest id is valid; the room created after it must not evict it.
    let top = hall.manager.create_or_get(RoomId(u64::MAX), RoomSettings::new("top", 5));
    assert_eq!(top.room_id(), RoomId(u64::MAX));
    let after = hall.manager.create_room(RoomSettings::new("after", 5));
    assert_ne!(after.room_id(), RoomId(u64::MAX));

    assert_eq!(hall.manager.room_count(), 4);
    assert!(!top.is_closed());
    assert_eq!(hall.manager.room_info(RoomId(u64::MAX)).await.unwrap().name, "top");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_room_creation_never_replaces_a_room() {
    let hall = hall_with(config(), Arc::new(MemoryWallet::new()), Arc::new(MemoryStore::new()));
    let mut tasks = Vec::new();
    for i in 0..16u64 {
        let manager = Arc::clone(&hall.manager);
        tasks.push(tokio::spawn(async move {
            let created = manager.create_room(RoomSettings::new("auto", 1));
            let named = manager.create_or_get(RoomId(i + 1), RoomSettings::new("named", 1));
            (created, named)
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        let (created, named) = task.await.unwrap();
        handles.push(created);
        handles.push(named);
    }
    let created_ids: BTreeSet<RoomId> = handles.iter().map(|h| h.room_id()).collect();
    assert_eq!(hall.manager.room_count(), created_ids.len());
    for handle in &handles {
        assert!(!handle.is_closed(), "room {} lost its actor", handle.room_id());
        assert!(hall.manager.room_info(handle.room_id()).await.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn test_destroy_lets_a_pending_payout_land() {
    let inner = MemoryWallet::new();
    inner.deposit(UserId(1), 100).await;
    let wallet = Arc::new(SlowWallet::new(inner, Duration::ZERO));
    let store = Arc::new(MemoryStore::new());
    let hall = hall_with(config(), wallet.clone(), store.clone());
    let room = hall.manager.create_room(RoomSettings::new("closing", 10));
    let room_id = room.room_id();
    play_to_a_line(&hall, &room, 1).await;
    let game_key = room.snapshot().await.unwrap().game_key;

    // Slower than the old fixed grace, within the wallet timeout.
    wallet.set_credit_delay(Duration::from_secs(2));
    let claim = tokio::spawn({
        let room = room.clone();
        async move { room.claim_win(UserId(1), 0).await }
    });
    // Let the actor pick up the claim and start the credit.
    tokio::time::sleep(Duration::from_millis(10)).await;

    hall.manager.destroy(room_id).await.unwrap();
    assert!(room.is_closed());
    assert!(wallet.inner.is_applied(&TxnId::payout(game_key)).await);
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 100);
    assert!(claim.await.unwrap().unwrap().settled);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let record = store.load_room(room_id).await.unwrap().unwrap();
    assert!(matches!(record.outcome, Some(Outcome::Won { settled: true, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_remove_and_destroy() {
    let hall = hall_with(config(), Arc::new(MemoryWallet::new()), Arc::new(MemoryStore::new()));
    let room = hall.manager.create_room(RoomSettings::new("teardown", 0));
    let room_id = room.room_id();

    assert!(matches!(
        hall.manager.remove(room_id).await,
        Err(RoomError::StillLive(_))
    ));

    hall.manager.destroy(room_id).await.unwrap();
    assert!(!hall.manager.contains(room_id));
    assert!(room.is_closed());
    assert!(matches!(room.snapshot().await, Err(RoomError::Unavailable(_))));

    let err = hall.manager.start(room_id).await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
    assert_eq!(err.kind().code(), 404);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_the_draw_loop() {
    let wallet = funded_wallet(&[1], 100).await;
    let hall = hall_with(config(), wallet, Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("doomed", 10));
    let mut events = subscribe(&hall.hub, room.room_id(), 99);

    room.join(UserId(1), vec![card_id]).await.unwrap();
    room.start().await.unwrap();
    assert!(next_call(&mut events).await.is_some());

    hall.manager.destroy(room.room_id()).await.unwrap();
    while events.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
    assert!(matches!(
        hall.manager.room_info(room.room_id()).await,
        Err(RoomError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reaper_abandons_unattended_game_then_removes_it() {
    let wallet = funded_wallet(&[1], 100).await;
    let config = RoomConfig {
        idle_timeout: Duration::from_secs(30),
        ..config()
    };
    let hall = hall_with(config, wallet.clone(), Arc::new(MemoryStore::new()));
    let card_id = give_card(&hall.store, 1, fixed_card()).await;
    let room = hall.manager.create_room(RoomSettings::new("ghost", 10));
    let empty = hall.manager.create_room(RoomSettings::new("empty", 10));
    let watched = hall.manager.create_room(RoomSettings::new("watched", 10));
    let _listener = subscribe(&hall.hub, watched.room_id(), 99);

    room.join(UserId(1), vec![card_id]).await.unwrap();
    room.start().await.unwrap();

    // First sighting only starts the idle clock.
    assert!(hall.manager.reap().await.is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    let report = hall.manager.reap().await;
    assert_eq!(report.abandoned, vec![room.room_id()]);
    assert_eq!(report.removed, vec![empty.room_id()]);

    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.status, RoomStatus::Finished);
    assert_eq!(
        snapshot.outcome,
        Some(Outcome::Void {
            reason: VoidReason::Abandoned
        })
    );
    assert_eq!(wallet.balance(UserId(1)).await.unwrap(), 90);

    let report = hall.manager.reap().await;
    assert_eq!(report.removed, vec![room.room_id()]);
    assert_eq!(hall.manager.room_ids(), vec![watched.room_id()]);
}

// =========================================================================
// Recovery
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_recover_rehosts_waiting_rooms_and_voids_games_in_play() {
    let wallet = funded_wallet(&[1, 2], 100).await;
    let store = Arc::new(MemoryStore::new());
    let first = hall_with(config(), wallet.clone(), store.clone());
    let waiting_card = give_card(&store, 1, fixed_card()).await;
    let playing_card = give_card(&store, 2, fixed_card()).await;

    let waiting = first.manager.create_room(RoomSettings::new("waiting", 10));
    let playing = first.manager.create_room(RoomSettings::new("playing", 10));
    waiting.join(UserId(1), vec![waiting_card]).await.unwrap();
    playing.join(UserId(2), vec![playing_card]).await.unwrap();
    playing.start().await.unwrap();
    let game_key = waiting.snapshot().await.unwrap().game_key;

    // Let the first calls and the write-behind queue land.
    tokio::time::sleep(Duration::from_secs(4)).await;
    first.manager.shutdown().await;
    assert_eq!(first.manager.room_count(), 0);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = hall_with(config(), wallet.clone(), store.clone());
    let report = second.manager.recover().await.unwrap();
    assert_eq!(report.rehosted, vec![waiting.room_id()]);
    assert_eq!(report.voided, vec![playing.room_id()]);

    let restored = second.manager.room_info(waiting.room_id()).await.unwrap();
    assert_eq!(restored.status, RoomStatus::Waiting);
    assert_eq!(restored.player_count, 1);
    assert_eq!(restored.game_key, game_key);
    let view = second
        .manager
        .participant(waiting.room_id(), UserId(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.cards[0].card_id, waiting_card);

    let voided = store.load_room(playing.room_id()).await.unwrap().unwrap();
    assert_eq!(voided.status, RoomStatus::Finished);
    assert_eq!(
        voided.outcome,
        Some(Outcome::Void {
            reason: VoidReason::Interrupted
        })
    );
    assert!(!store.calls(playing.room_id()).await.unwrap().is_empty());
    let participants = store.participants(playing.room_id()).await.unwrap();
    assert_eq!(participants[0].status, ParticipantStatus::Lost);

    let fresh = second.manager.create_room(RoomSettings::new("fresh", 10));
    assert!(fresh.room_id() > playing.room_id());
}
