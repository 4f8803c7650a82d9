//! Core game state machine.
//!
//! This module contains the main `GameState` struct and all game logic.
//! Every mutation of the board or ledger during play goes through
//! [`GameState::apply`]; an action that fails validation returns a
//! [`GameError`] and leaves the state exactly as it was.

use crate::actions::{DevelopmentPlay, GameAction, GameEvent, TradeOffer, TradePartner};
use crate::board::{Board, BoardLayout, GenerationError, Harbor, PlacementError, Resource, Tier};
use crate::hex::{EdgeCoord, HexCoord, NodeCoord};
use crate::ledger::{costs, Colour, DevelopmentCard, Ledger, LedgerError, PlayerLedger, ResourceHand};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 4;

/// Tunable rule values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Victory points needed to win
    pub victory_points_to_win: u32,
    /// Minimum road length for Longest Road
    pub min_longest_road: u32,
    /// Minimum knights for Largest Army
    pub min_largest_army: u32,
    /// Players holding more cards than this discard half on a 7
    pub discard_limit: u32,
    /// Whether an opponent's settlement splits a road for Longest Road
    pub settlements_break_roads: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            victory_points_to_win: 10,
            min_longest_road: 5,
            min_largest_army: 3,
            discard_limit: 7,
            settlements_break_roads: true,
        }
    }
}

/// Game phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Initial placement phase
    Setup {
        /// Which round of setup (1 or 2)
        round: u8,
        /// What we're currently placing
        placing: SetupPlacing,
    },

    /// Before rolling dice at start of turn
    Rolling,

    /// Players must discard half their cards (rolled 7, too many cards)
    Discarding {
        /// Players who still need to discard, in seat order
        remaining: Vec<Colour>,
    },

    /// After rolling 7, must move robber
    RobberPlacement,

    /// Main phase - can trade, build, buy dev cards, end turn
    AwaitingMove,

    /// A trade offer is waiting on its recipient
    TradePending { offer: TradeOffer },

    /// Game is over
    Finished { winner: Colour },
}

/// What we're placing during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupPlacing {
    Settlement,
    Road,
}

/// Errors that can occur when applying actions
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("needs {need} {resource:?} but holds {have}")]
    InsufficientResources {
        resource: Resource,
        have: u32,
        need: u32,
    },

    #[error("illegal placement: {0}")]
    IllegalPlacement(PlacementError),

    #[error("no settlement of yours to upgrade there")]
    InvalidUpgrade,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action for current phase")]
    InvalidPhase,

    #[error("No pieces remaining")]
    NoPiecesRemaining,

    #[error("No development cards left in deck")]
    EmptyDeck,

    #[error("Don't have that card")]
    NoSuchCard,

    #[error("card can't be played this turn")]
    CardNotPlayable,

    #[error("Invalid trade")]
    InvalidTrade,

    #[error("Invalid discard")]
    InvalidDiscard,

    #[error("robber can't go there or steal from that player")]
    InvalidRobberTarget,

    #[error("more than one player can be robbed; name a victim")]
    VictimRequired,

    #[error("dice values must be 1-6")]
    InvalidDice,

    #[error("Game is over")]
    GameOver,

    #[error("a game needs 2-4 players with distinct colours")]
    InvalidPlayers,

    #[error("no player with colour {0}")]
    UnknownPlayer(Colour),

    #[error("board generation failed: {0}")]
    BoardGeneration(GenerationError),
}

impl From<LedgerError> for GameError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientResources {
                resource,
                have,
                need,
            } => GameError::InsufficientResources {
                resource,
                have,
                need,
            },
            LedgerError::UnknownPlayer(colour) => GameError::UnknownPlayer(colour),
        }
    }
}

impl From<PlacementError> for GameError {
    fn from(err: PlacementError) -> Self {
        GameError::IllegalPlacement(err)
    }
}

impl From<GenerationError> for GameError {
    fn from(err: GenerationError) -> Self {
        GameError::BoardGeneration(err)
    }
}

/// The complete game state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    /// All players, in seat order
    ledger: Ledger,
    /// Seat index of the current player
    current: usize,
    phase: GamePhase,
    /// Turn number (0 during setup, then starts at 1)
    turn_number: u32,
    /// Last dice roll
    dice_roll: Option<(u8, u8)>,
    /// Development card deck
    dev_deck: Vec<DevelopmentCard>,
    /// Whether a dev card has been played this turn
    dev_card_played_this_turn: bool,
    /// Setup phase tracking: which settlement was just placed
    setup_settlement: Option<NodeCoord>,
    rules: GameRules,
    rng: ChaCha8Rng,
}

impl GameState {
    /// Create a new game on a freshly generated board.
    ///
    /// The seed drives board generation, the deck shuffle, dice and steals.
    pub fn new(
        players: Vec<(Colour, String)>,
        seed: u64,
        rules: GameRules,
    ) -> Result<Self, GameError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let board = Board::generate_with_rng(&BoardLayout::standard(), &mut rng)?;
        Self::assemble(players, board, rng, rules)
    }

    /// Create a new game on an existing board
    pub fn with_board(
        players: Vec<(Colour, String)>,
        board: Board,
        seed: u64,
        rules: GameRules,
    ) -> Result<Self, GameError> {
        Self::assemble(players, board, ChaCha8Rng::seed_from_u64(seed), rules)
    }

    fn assemble(
        players: Vec<(Colour, String)>,
        board: Board,
        mut rng: ChaCha8Rng,
        rules: GameRules,
    ) -> Result<Self, GameError> {
        let colours: BTreeSet<Colour> = players.iter().map(|(c, _)| *c).collect();
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&players.len()) || colours.len() != players.len()
        {
            return Err(GameError::InvalidPlayers);
        }

        let mut dev_deck = DevelopmentCard::standard_deck();
        dev_deck.shuffle(&mut rng);

        Ok(Self {
            board,
            ledger: Ledger::new(players),
            current: 0,
            phase: GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement,
            },
            turn_number: 0,
            dice_roll: None,
            dev_deck,
            dev_card_played_this_turn: false,
            setup_settlement: None,
            rules,
            rng,
        })
    }

    // ==================== Accessors ====================

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// All players in seat order
    pub fn players(&self) -> &[PlayerLedger] {
        self.ledger.players()
    }

    pub fn player(&self, colour: Colour) -> Option<&PlayerLedger> {
        self.ledger.player(colour)
    }

    pub fn phase(&self) -> &GamePhase {
        &self.phase
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Colour whose turn it is
    pub fn current_player(&self) -> Colour {
        self.ledger.players()[self.current].colour
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn dice_roll(&self) -> Option<(u8, u8)> {
        self.dice_roll
    }

    pub fn dev_cards_remaining(&self) -> usize {
        self.dev_deck.len()
    }

    /// Calculate total victory points for a player
    pub fn victory_points(&self, colour: Colour) -> u32 {
        self.ledger
            .player(colour)
            .map(|p| p.victory_points())
            .unwrap_or(0)
    }

    /// Check if game is over
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, GamePhase::Finished { .. })
    }

    /// Get the winner if game is over
    pub fn winner(&self) -> Option<Colour> {
        match self.phase {
            GamePhase::Finished { winner } => Some(winner),
            _ => None,
        }
    }

    /// The colour the game is waiting on
    pub fn pending_actor(&self) -> Option<Colour> {
        match &self.phase {
            GamePhase::Finished { .. } => None,
            GamePhase::Discarding { remaining } => remaining.first().copied(),
            GamePhase::TradePending { offer } => match offer.to {
                TradePartner::Player(colour) => Some(colour),
                TradePartner::Bank => Some(offer.from),
            },
            _ => Some(self.current_player()),
        }
    }

    /// Bank exchange rate for giving away `resource`
    pub fn bank_rate(&self, colour: Colour, resource: Resource) -> u32 {
        self.board
            .harbors_of(colour)
            .iter()
            .filter(|h| matches!(h, Harbor::Generic) || **h == Harbor::Specific(resource))
            .map(|h| h.rate())
            .min()
            .unwrap_or(4)
    }

    // ==================== Legal Actions ====================

    /// Actions `colour` may take right now.
    ///
    /// Empty unless `colour` is the pending actor. Discards are offered as a
    /// single suggestion; any hand of the right size is accepted.
    pub fn legal_actions(&self, colour: Colour) -> Vec<GameAction> {
        if self.pending_actor() != Some(colour) {
            return Vec::new();
        }

        match &self.phase {
            GamePhase::Finished { .. } => Vec::new(),

            GamePhase::Setup {
                placing: SetupPlacing::Settlement,
                ..
            } => self
                .board
                .valid_settlement_spots(colour, true)
                .into_iter()
                .map(GameAction::BuildSettlement)
                .collect(),

            GamePhase::Setup {
                placing: SetupPlacing::Road,
                ..
            } => match self.setup_settlement {
                Some(anchor) => self
                    .board
                    .edges_of(&anchor)
                    .iter()
                    .filter(|e| self.board.check_road(colour, e, None).is_ok())
                    .map(|e| GameAction::BuildRoad(*e))
                    .collect(),
                None => Vec::new(),
            },

            GamePhase::Rolling => {
                let mut actions = vec![GameAction::RollDice];
                actions.extend(self.knight_plays(colour));
                actions
            }

            GamePhase::Discarding { .. } => {
                vec![GameAction::Discard(self.suggested_discard(colour))]
            }

            GamePhase::RobberPlacement => self
                .robber_targets(colour)
                .into_iter()
                .map(|(hex, victim)| GameAction::MoveRobber { hex, victim })
                .collect(),

            GamePhase::AwaitingMove => self.turn_actions(colour),

            GamePhase::TradePending { offer } => {
                let mut actions = Vec::new();
                if self.ledger.can_afford(colour, &offer.requesting) {
                    actions.push(GameAction::RespondToTrade { accept: true });
                }
                actions.push(GameAction::RespondToTrade { accept: false });
                actions
            }
        }
    }

    fn turn_actions(&self, colour: Colour) -> Vec<GameAction> {
        let mut actions = Vec::new();
        let Some(p) = self.ledger.player(colour) else {
            return actions;
        };

        // Building actions
        if p.roads_remaining() > 0 && p.hand.can_afford(&costs::road()) {
            for edge in self.board.valid_road_spots(colour) {
                actions.push(GameAction::BuildRoad(edge));
            }
        }
        if p.settlements_remaining() > 0 && p.hand.can_afford(&costs::settlement()) {
            for node in self.board.valid_settlement_spots(colour, false) {
                actions.push(GameAction::BuildSettlement(node));
            }
        }
        if p.cities_remaining() > 0 && p.hand.can_afford(&costs::city()) {
            for node in self.board.valid_city_spots(colour) {
                actions.push(GameAction::BuildCity(node));
            }
        }
        if !self.dev_deck.is_empty() && p.hand.can_afford(&costs::development_card()) {
            actions.push(GameAction::BuyDevelopmentCard);
        }

        // Development cards
        if !self.dev_card_played_this_turn {
            actions.extend(self.knight_plays(colour));
            if p.dev_cards.contains(&DevelopmentCard::RoadBuilding) && p.roads_remaining() > 0 {
                for first in self.board.valid_road_spots(colour) {
                    let second = if p.roads_remaining() >= 2 {
                        self.board
                            .topology()
                            .edges()
                            .iter()
                            .find(|e| self.board.check_road(colour, e, Some(&first)).is_ok())
                            .copied()
                    } else {
                        None
                    };
                    actions.push(GameAction::PlayDevelopmentCard(
                        DevelopmentPlay::RoadBuilding(first, second),
                    ));
                }
            }
            if p.dev_cards.contains(&DevelopmentCard::YearOfPlenty) {
                for (i, r1) in Resource::ALL.into_iter().enumerate() {
                    for r2 in Resource::ALL.into_iter().skip(i) {
                        actions.push(GameAction::PlayDevelopmentCard(
                            DevelopmentPlay::YearOfPlenty(r1, r2),
                        ));
                    }
                }
            }
            if p.dev_cards.contains(&DevelopmentCard::Monopoly) {
                for r in Resource::ALL {
                    actions.push(GameAction::PlayDevelopmentCard(DevelopmentPlay::Monopoly(r)));
                }
            }
        }

        // Bank trades
        for give in Resource::ALL {
            let rate = self.bank_rate(colour, give);
            if p.hand.get(give) < rate {
                continue;
            }
            for receive in Resource::ALL.into_iter().filter(|r| *r != give) {
                actions.push(GameAction::ProposeTrade(TradeOffer::new(
                    colour,
                    TradePartner::Bank,
                    ResourceHand::single(give, rate),
                    ResourceHand::single(receive, 1),
                )));
            }
        }

        actions.push(GameAction::EndTurn);
        actions
    }

    fn knight_plays(&self, colour: Colour) -> Vec<GameAction> {
        let holds_knight = self
            .ledger
            .player(colour)
            .is_some_and(|p| p.dev_cards.contains(&DevelopmentCard::Knight));
        if self.dev_card_played_this_turn || !holds_knight {
            return Vec::new();
        }
        self.robber_targets(colour)
            .into_iter()
            .map(|(hex, victim)| GameAction::PlayDevelopmentCard(DevelopmentPlay::Knight { hex, victim }))
            .collect()
    }

    /// Every robber destination, once per possible victim
    fn robber_targets(&self, colour: Colour) -> Vec<(HexCoord, Option<Colour>)> {
        let mut targets = Vec::new();
        for tile in self.board.tiles() {
            if tile.coord == self.board.robber_location() {
                continue;
            }
            let victims = self.robber_candidates(colour, &tile.coord);
            if victims.is_empty() {
                targets.push((tile.coord, None));
            }
            targets.extend(victims.into_iter().map(|v| (tile.coord, Some(v))));
        }
        targets
    }

    /// Take from the largest piles until half the hand is gone
    fn suggested_discard(&self, colour: Colour) -> ResourceHand {
        let mut hand = self.ledger.hand(colour);
        let mut discard = ResourceHand::new();
        for _ in 0..hand.total() / 2 {
            let Some((resource, _)) = hand.iter().max_by_key(|(_, n)| *n) else {
                break;
            };
            hand.try_subtract(&ResourceHand::single(resource, 1));
            discard.add(resource, 1);
        }
        discard
    }

    // ==================== Applying Actions ====================

    /// Apply an action to the game state
    pub fn apply(&mut self, colour: Colour, action: GameAction) -> Result<Vec<GameEvent>, GameError> {
        // Check game not over
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        if self.ledger.player(colour).is_none() {
            return Err(GameError::UnknownPlayer(colour));
        }

        let events = match action {
            GameAction::RollDice => {
                self.require_turn(colour)?;
                self.require_phase(GamePhase::Rolling)?;
                let dice = (self.rng.gen_range(1..=6), self.rng.gen_range(1..=6));
                self.roll_with(colour, dice)?
            }
            GameAction::BuildRoad(edge) => self.build_road(colour, edge)?,
            GameAction::BuildSettlement(node) => self.build_settlement(colour, node)?,
            GameAction::BuildCity(node) => self.build_city(colour, node)?,
            GameAction::BuyDevelopmentCard => self.buy_development_card(colour)?,
            GameAction::PlayDevelopmentCard(play) => self.play_development_card(colour, play)?,
            GameAction::ProposeTrade(offer) => self.propose_trade(colour, offer)?,
            GameAction::RespondToTrade { accept } => self.respond_to_trade(colour, accept)?,
            GameAction::MoveRobber { hex, victim } => {
                self.require_turn(colour)?;
                self.require_phase(GamePhase::RobberPlacement)?;
                let victim = self.robber_victim(colour, hex, victim)?;
                let events = self.relocate_robber(colour, hex, victim);
                self.phase = GamePhase::AwaitingMove;
                events
            }
            GameAction::Discard(cards) => self.discard(colour, cards)?,
            GameAction::EndTurn => self.end_turn(colour)?,
        };

        Ok(events)
    }

    /// Roll with known dice values, for replays and tests
    pub fn roll_with(&mut self, colour: Colour, dice: (u8, u8)) -> Result<Vec<GameEvent>, GameError> {
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        if !(1..=6).contains(&dice.0) || !(1..=6).contains(&dice.1) {
            return Err(GameError::InvalidDice);
        }
        self.require_turn(colour)?;
        self.require_phase(GamePhase::Rolling)?;

        let total = dice.0 + dice.1;
        self.dice_roll = Some(dice);
        debug!(%colour, total, "dice rolled");

        let mut events = vec![GameEvent::DiceRolled {
            colour,
            dice,
            total,
        }];

        if total == 7 {
            // Distribution is skipped entirely on a 7
            let limit = self.rules.discard_limit;
            let remaining: Vec<Colour> = self
                .ledger
                .players()
                .iter()
                .filter(|p| p.hand.total() > limit)
                .map(|p| p.colour)
                .collect();
            self.phase = if remaining.is_empty() {
                GamePhase::RobberPlacement
            } else {
                GamePhase::Discarding { remaining }
            };
        } else {
            let grants = self.ledger.distribute(&self.board, total);
            events.extend(grants.into_iter().map(|g| GameEvent::ResourceGranted {
                colour: g.colour,
                resource: g.resource,
                amount: g.amount,
                roll: Some(total),
            }));
            self.phase = GamePhase::AwaitingMove;
        }

        Ok(events)
    }

    fn require_turn(&self, colour: Colour) -> Result<(), GameError> {
        if colour != self.current_player() {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    fn require_phase(&self, phase: GamePhase) -> Result<(), GameError> {
        if self.phase != phase {
            return Err(GameError::InvalidPhase);
        }
        Ok(())
    }

    fn require_funds(&self, colour: Colour, cost: &ResourceHand) -> Result<(), GameError> {
        let hand = self.ledger.hand(colour);
        match hand.shortfall(cost) {
            Some((resource, have, need)) => Err(GameError::InsufficientResources {
                resource,
                have,
                need,
            }),
            None => Ok(()),
        }
    }

    fn player_mut(&mut self, colour: Colour) -> Result<&mut PlayerLedger, GameError> {
        self.ledger
            .player_mut(colour)
            .ok_or(GameError::UnknownPlayer(colour))
    }

    fn lay_road(&mut self, colour: Colour, edge: EdgeCoord) {
        self.board.place_road(edge, colour);
        self.ledger.record_road(colour, edge);
    }

    fn found_settlement(&mut self, colour: Colour, node: NodeCoord) {
        self.board.place_settlement(node, colour);
        self.ledger.record_settlement(colour, node);
    }

    fn build_road(&mut self, colour: Colour, edge: EdgeCoord) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;

        match self.phase {
            GamePhase::Setup {
                placing: SetupPlacing::Road,
                ..
            } => {
                let anchor = self.setup_settlement.ok_or(GameError::InvalidPhase)?;
                self.board.check_road(colour, &edge, None)?;
                if !self.board.topology().nodes_of_edge(&edge).contains(&anchor) {
                    return Err(PlacementError::NotBesideSetupSettlement.into());
                }

                self.lay_road(colour, edge);
                self.setup_settlement = None;

                let mut events = vec![GameEvent::RoadBuilt { colour, edge }];
                events.extend(self.update_longest_road());
                events.extend(self.advance_setup());
                Ok(events)
            }

            GamePhase::AwaitingMove => {
                let remaining = self.ledger.player(colour).map_or(0, |p| p.roads_remaining());
                if remaining == 0 {
                    return Err(GameError::NoPiecesRemaining);
                }
                self.require_funds(colour, &costs::road())?;
                self.board.check_road(colour, &edge, None)?;

                self.ledger.spend(colour, &costs::road())?;
                self.lay_road(colour, edge);

                let mut events = vec![GameEvent::RoadBuilt { colour, edge }];
                events.extend(self.update_longest_road());
                events.extend(self.check_win(colour));
                Ok(events)
            }

            _ => Err(GameError::InvalidPhase),
        }
    }

    fn build_settlement(
        &mut self,
        colour: Colour,
        node: NodeCoord,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;

        match self.phase {
            GamePhase::Setup {
                round,
                placing: SetupPlacing::Settlement,
            } => {
                self.board.check_settlement(colour, &node, true)?;
                self.found_settlement(colour, node);
                self.setup_settlement = Some(node);

                let mut events = vec![GameEvent::SettlementBuilt { colour, node }];

                // In round 2, give resources for second settlement
                if round == 2 {
                    let mut income = ResourceHand::new();
                    for hex in self.board.hexes_of(&node) {
                        if let Some(resource) = self.board.tile(hex).and_then(|t| t.resource()) {
                            income.add(resource, 1);
                        }
                    }
                    self.ledger.grant(colour, &income);
                    events.extend(income.iter().map(|(resource, amount)| {
                        GameEvent::ResourceGranted {
                            colour,
                            resource,
                            amount,
                            roll: None,
                        }
                    }));
                }

                self.phase = GamePhase::Setup {
                    round,
                    placing: SetupPlacing::Road,
                };
                events.extend(self.check_win(colour));
                Ok(events)
            }

            GamePhase::AwaitingMove => {
                let remaining = self
                    .ledger
                    .player(colour)
                    .map_or(0, |p| p.settlements_remaining());
                if remaining == 0 {
                    return Err(GameError::NoPiecesRemaining);
                }
                self.require_funds(colour, &Tier::Settlement.cost())?;
                self.board.check_settlement(colour, &node, false)?;

                self.ledger.spend(colour, &Tier::Settlement.cost())?;
                self.found_settlement(colour, node);

                let mut events = vec![GameEvent::SettlementBuilt { colour, node }];
                // A new settlement can cut an opponent's road
                events.extend(self.update_longest_road());
                events.extend(self.check_win(colour));
                Ok(events)
            }

            _ => Err(GameError::InvalidPhase),
        }
    }

    fn build_city(&mut self, colour: Colour, node: NodeCoord) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;
        self.require_phase(GamePhase::AwaitingMove)?;

        match self.board.structure_at(&node) {
            Some(s) if s.colour == colour && s.tier == Tier::Settlement => {}
            _ => return Err(GameError::InvalidUpgrade),
        }
        let remaining = self.ledger.player(colour).map_or(0, |p| p.cities_remaining());
        if remaining == 0 {
            return Err(GameError::NoPiecesRemaining);
        }
        self.ledger.spend(colour, &Tier::City.cost())?;

        self.board.upgrade_to_city(node, colour);
        self.ledger.record_city(colour, node);

        let mut events = vec![GameEvent::CityBuilt { colour, node }];
        events.extend(self.check_win(colour));
        Ok(events)
    }

    fn buy_development_card(&mut self, colour: Colour) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;
        self.require_phase(GamePhase::AwaitingMove)?;
        if self.dev_deck.is_empty() {
            return Err(GameError::EmptyDeck);
        }
        self.ledger.spend(colour, &costs::development_card())?;

        let card = self.dev_deck.pop().ok_or(GameError::EmptyDeck)?;
        self.player_mut(colour)?.dev_cards_bought_this_turn.push(card);

        let mut events = vec![GameEvent::DevelopmentCardBought {
            colour,
            card: Some(card),
        }];
        if card == DevelopmentCard::VictoryPoint {
            events.extend(self.check_win(colour));
        }
        Ok(events)
    }

    fn play_development_card(
        &mut self,
        colour: Colour,
        play: DevelopmentPlay,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;
        let card = play.card();
        match (&self.phase, card) {
            (GamePhase::AwaitingMove, _) | (GamePhase::Rolling, DevelopmentCard::Knight) => {}
            _ => return Err(GameError::InvalidPhase),
        }
        if self.dev_card_played_this_turn {
            return Err(GameError::CardNotPlayable);
        }

        let (held, fresh, roads_left) = match self.ledger.player(colour) {
            Some(p) => (
                p.dev_cards.contains(&card),
                p.dev_cards_bought_this_turn.contains(&card),
                p.roads_remaining(),
            ),
            None => return Err(GameError::UnknownPlayer(colour)),
        };
        if !held {
            return Err(if fresh {
                GameError::CardNotPlayable
            } else {
                GameError::NoSuchCard
            });
        }

        let mut events = Vec::new();
        match play {
            DevelopmentPlay::Knight { hex, victim } => {
                let victim = self.robber_victim(colour, hex, victim)?;
                self.consume_card(colour, card)?;
                events.push(GameEvent::DevelopmentCardPlayed { colour, card });
                events.extend(self.relocate_robber(colour, hex, victim));

                self.player_mut(colour)?.knights_played += 1;
                events.extend(self.update_largest_army(colour));
            }

            DevelopmentPlay::RoadBuilding(first, second) => {
                let needed = if second.is_some() { 2 } else { 1 };
                if roads_left < needed {
                    return Err(GameError::NoPiecesRemaining);
                }
                self.board.check_road(colour, &first, None)?;
                if let Some(second) = &second {
                    self.board.check_road(colour, second, Some(&first))?;
                }

                self.consume_card(colour, card)?;
                events.push(GameEvent::DevelopmentCardPlayed { colour, card });
                for edge in std::iter::once(first).chain(second) {
                    self.lay_road(colour, edge);
                    events.push(GameEvent::RoadBuilt { colour, edge });
                }
                events.extend(self.update_longest_road());
            }

            DevelopmentPlay::YearOfPlenty(r1, r2) => {
                self.consume_card(colour, card)?;
                events.push(GameEvent::DevelopmentCardPlayed { colour, card });

                let mut income = ResourceHand::single(r1, 1);
                income.add(r2, 1);
                self.ledger.grant(colour, &income);
                events.extend(income.iter().map(|(resource, amount)| {
                    GameEvent::ResourceGranted {
                        colour,
                        resource,
                        amount,
                        roll: None,
                    }
                }));
            }

            DevelopmentPlay::Monopoly(resource) => {
                self.consume_card(colour, card)?;
                events.push(GameEvent::DevelopmentCardPlayed { colour, card });

                let total = self.ledger.take_all(colour, resource);
                events.push(GameEvent::MonopolyCollected {
                    colour,
                    resource,
                    total,
                });
            }
        }

        events.extend(self.check_win(colour));
        Ok(events)
    }

    fn consume_card(&mut self, colour: Colour, card: DevelopmentCard) -> Result<(), GameError> {
        if !self.player_mut(colour)?.take_card(card) {
            return Err(GameError::NoSuchCard);
        }
        self.dev_card_played_this_turn = true;
        Ok(())
    }

    /// Opponents on `hex` with at least one card
    fn robber_candidates(&self, colour: Colour, hex: &HexCoord) -> Vec<Colour> {
        self.board
            .colours_on_hex(hex)
            .into_iter()
            .filter(|c| *c != colour && !self.ledger.hand(*c).is_empty())
            .collect()
    }

    /// Check a robber move and settle who gets robbed
    fn robber_victim(
        &self,
        colour: Colour,
        hex: HexCoord,
        victim: Option<Colour>,
    ) -> Result<Option<Colour>, GameError> {
        if self.board.tile(&hex).is_none() || hex == self.board.robber_location() {
            return Err(GameError::InvalidRobberTarget);
        }

        let candidates = self.robber_candidates(colour, &hex);
        match victim {
            Some(v) if candidates.contains(&v) => Ok(Some(v)),
            Some(_) => Err(GameError::InvalidRobberTarget),
            None => match candidates.as_slice() {
                [] => Ok(None),
                [only] => Ok(Some(*only)),
                _ => Err(GameError::VictimRequired),
            },
        }
    }

    fn relocate_robber(
        &mut self,
        colour: Colour,
        hex: HexCoord,
        victim: Option<Colour>,
    ) -> Vec<GameEvent> {
        let from = self.board.robber_location();
        self.board.move_robber(hex);

        let mut events = vec![GameEvent::RobberMoved {
            colour,
            from,
            to: hex,
        }];
        if let Some(victim) = victim {
            let stolen = self.ledger.steal_random(colour, victim, &mut self.rng);
            events.push(GameEvent::ResourceStolen {
                thief: colour,
                victim,
                resource: stolen,
            });
        }
        events
    }

    fn discard(&mut self, colour: Colour, cards: ResourceHand) -> Result<Vec<GameEvent>, GameError> {
        let GamePhase::Discarding { remaining } = &self.phase else {
            return Err(GameError::InvalidPhase);
        };
        if !remaining.contains(&colour) {
            return Err(GameError::NotYourTurn);
        }

        let hand = self.ledger.hand(colour);
        if cards.total() != hand.total() / 2 || !hand.can_afford(&cards) {
            return Err(GameError::InvalidDiscard);
        }
        self.ledger.spend(colour, &cards)?;

        if let GamePhase::Discarding { remaining } = &mut self.phase {
            remaining.retain(|c| *c != colour);
            if remaining.is_empty() {
                self.phase = GamePhase::RobberPlacement;
            }
        }

        Ok(vec![GameEvent::CardsDiscarded {
            colour,
            count: cards.total(),
        }])
    }

    fn propose_trade(
        &mut self,
        colour: Colour,
        offer: TradeOffer,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;
        self.require_phase(GamePhase::AwaitingMove)?;
        if offer.from != colour || !offer.is_valid() {
            return Err(GameError::InvalidTrade);
        }
        self.require_funds(colour, &offer.offering)?;

        match offer.to {
            TradePartner::Bank => {
                self.check_bank_trade(colour, &offer)?;
                self.ledger.spend(colour, &offer.offering)?;
                self.ledger.grant(colour, &offer.requesting);
                Ok(vec![GameEvent::TradeCompleted {
                    from: colour,
                    to: TradePartner::Bank,
                    gave: offer.offering,
                    received: offer.requesting,
                }])
            }
            TradePartner::Player(other) => {
                if other == colour || self.ledger.player(other).is_none() {
                    return Err(GameError::InvalidTrade);
                }
                self.phase = GamePhase::TradePending {
                    offer: offer.clone(),
                };
                Ok(vec![GameEvent::TradeProposed { offer }])
            }
        }
    }

    /// One kind given at the bank rate for each single card of another kind
    fn check_bank_trade(&self, colour: Colour, offer: &TradeOffer) -> Result<(), GameError> {
        let given: Vec<(Resource, u32)> = offer.offering.iter().collect();
        let wanted: Vec<(Resource, u32)> = offer.requesting.iter().collect();
        let ([(give, give_count)], [(take, take_count)]) = (given.as_slice(), wanted.as_slice())
        else {
            return Err(GameError::InvalidTrade);
        };
        if give == take || *give_count != self.bank_rate(colour, *give) * take_count {
            return Err(GameError::InvalidTrade);
        }
        Ok(())
    }

    fn respond_to_trade(
        &mut self,
        colour: Colour,
        accept: bool,
    ) -> Result<Vec<GameEvent>, GameError> {
        let GamePhase::TradePending { offer } = &self.phase else {
            return Err(GameError::InvalidPhase);
        };
        let offer = offer.clone();
        if offer.to != TradePartner::Player(colour) {
            return Err(GameError::NotYourTurn);
        }

        if !accept {
            self.phase = GamePhase::AwaitingMove;
            return Ok(vec![GameEvent::TradeDeclined {
                from: offer.from,
                by: colour,
            }]);
        }

        self.require_funds(colour, &offer.requesting)?;
        self.require_funds(offer.from, &offer.offering)?;
        self.ledger.transfer(offer.from, colour, &offer.offering)?;
        self.ledger.transfer(colour, offer.from, &offer.requesting)?;
        self.phase = GamePhase::AwaitingMove;

        Ok(vec![GameEvent::TradeCompleted {
            from: offer.from,
            to: offer.to,
            gave: offer.offering,
            received: offer.requesting,
        }])
    }

    fn end_turn(&mut self, colour: Colour) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(colour)?;
        self.require_phase(GamePhase::AwaitingMove)?;

        // Cards bought this turn become playable
        self.player_mut(colour)?.unlock_new_cards();

        self.current = (self.current + 1) % self.ledger.players().len();
        self.turn_number += 1;
        self.dice_roll = None;
        self.dev_card_played_this_turn = false;
        self.phase = GamePhase::Rolling;

        let next = self.current_player();
        debug!(%next, turn = self.turn_number, "turn changed");
        Ok(vec![GameEvent::TurnChanged {
            colour: next,
            turn_number: self.turn_number,
        }])
    }

    // ==================== Helper Methods ====================

    fn advance_setup(&mut self) -> Vec<GameEvent> {
        let GamePhase::Setup { round, .. } = self.phase else {
            return Vec::new();
        };

        let seats = self.ledger.players().len();
        let placed: usize = self
            .ledger
            .players()
            .iter()
            .map(|p| p.settlements.len() + p.cities.len())
            .sum();

        // Setup uses snake order: 0,1,2,3,3,2,1,0
        if placed >= seats * 2 {
            self.current = 0;
            self.turn_number = 1;
            self.phase = GamePhase::Rolling;
        } else if round == 1 && placed >= seats {
            // Same player places again to open round 2
            self.phase = GamePhase::Setup {
                round: 2,
                placing: SetupPlacing::Settlement,
            };
            return Vec::new();
        } else if round == 1 {
            self.current += 1;
            self.phase = GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement,
            };
        } else {
            self.current = self.current.saturating_sub(1);
            self.phase = GamePhase::Setup {
                round: 2,
                placing: SetupPlacing::Settlement,
            };
        }

        vec![GameEvent::TurnChanged {
            colour: self.current_player(),
            turn_number: self.turn_number,
        }]
    }

    fn update_longest_road(&mut self) -> Vec<GameEvent> {
        let breaks = self.rules.settlements_break_roads;
        let lengths: Vec<(Colour, u32)> = self
            .ledger
            .players()
            .iter()
            .map(|p| (p.colour, self.board.longest_road(p.colour, breaks)))
            .collect();
        for (player, (_, length)) in self.ledger.players_mut().iter_mut().zip(&lengths) {
            player.longest_road = *length;
        }

        // Find current holder
        let current_holder = self
            .ledger
            .players()
            .iter()
            .find(|p| p.has_longest_road)
            .map(|p| p.colour);

        let best = lengths
            .iter()
            .map(|(_, length)| *length)
            .filter(|length| *length >= self.rules.min_longest_road)
            .max();

        let new_holder = best.and_then(|best| {
            let leaders: Vec<Colour> = lengths
                .iter()
                .filter(|(_, length)| *length == best)
                .map(|(colour, _)| *colour)
                .collect();
            match (current_holder, leaders.as_slice()) {
                // Ties keep current holder
                (Some(holder), _) if leaders.contains(&holder) => Some(holder),
                (_, [only]) => Some(*only),
                // Multiple tied, no current holder - no one gets it
                _ => None,
            }
        });

        if new_holder == current_holder {
            return Vec::new();
        }
        for player in self.ledger.players_mut() {
            player.has_longest_road = Some(player.colour) == new_holder;
        }
        vec![GameEvent::LongestRoadChanged {
            previous: current_holder,
            current: new_holder,
            length: best.unwrap_or(0),
        }]
    }

    fn update_largest_army(&mut self, colour: Colour) -> Vec<GameEvent> {
        let knights = self.ledger.player(colour).map_or(0, |p| p.knights_played);
        let current_holder = self
            .ledger
            .players()
            .iter()
            .find(|p| p.has_largest_army)
            .map(|p| (p.colour, p.knights_played));

        if knights < self.rules.min_largest_army {
            return Vec::new();
        }
        // Only change if new leader has strictly more
        match current_holder {
            Some((holder, _)) if holder == colour => return Vec::new(),
            Some((_, held)) if knights <= held => return Vec::new(),
            _ => {}
        }

        for player in self.ledger.players_mut() {
            player.has_largest_army = player.colour == colour;
        }
        vec![GameEvent::LargestArmyChanged {
            previous: current_holder.map(|(holder, _)| holder),
            current: Some(colour),
            knights,
        }]
    }

    fn check_win(&mut self, colour: Colour) -> Vec<GameEvent> {
        let victory_points = self.victory_points(colour);
        if victory_points < self.rules.victory_points_to_win {
            return Vec::new();
        }
        debug!(%colour, victory_points, "game won");
        self.phase = GamePhase::Finished { winner: colour };
        vec![GameEvent::GameWon {
            colour,
            victory_points,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::{free_corner, road_chain};
    use crate::ledger::ROAD_PIECES;
    use pretty_assertions::assert_eq;

    fn seats(colours: &[Colour]) -> Vec<(Colour, String)> {
        colours.iter().map(|c| (*c, c.to_string())).collect()
    }

    fn two_player_game(seed: u64) -> GameState {
        GameState::new(seats(&[Colour::Red, Colour::Blue]), seed, GameRules::default()).unwrap()
    }

    /// Play through setup taking the first legal action each time
    fn finish_setup(game: &mut GameState) -> Vec<Colour> {
        let mut settlers = Vec::new();
        while matches!(game.phase, GamePhase::Setup { .. }) {
            let actor = game.pending_actor().unwrap();
            let action = game.legal_actions(actor).remove(0);
            if matches!(action, GameAction::BuildSettlement(_)) {
                settlers.push(actor);
            }
            game.apply(actor, action).unwrap();
        }
        settlers
    }

    /// A fresh game skipped straight to Red's main phase
    fn main_phase(seed: u64) -> GameState {
        let mut game = two_player_game(seed);
        game.phase = GamePhase::AwaitingMove;
        game.turn_number = 1;
        game
    }

    /// A game whose board has a `resource` hex numbered `number`
    fn game_with_tile(resource: Resource, number: u8) -> (GameState, HexCoord) {
        (0..500)
            .find_map(|seed| {
                let game = main_phase(seed);
                let hex = game
                    .board
                    .tiles()
                    .find(|t| t.resource() == Some(resource) && t.number == Some(number))
                    .map(|t| t.coord)?;
                Some((game, hex))
            })
            .expect("some seed places the tile")
    }

    /// Give `colour` a settlement plus an adjoining road without going through setup
    fn settle(game: &mut GameState, colour: Colour, node: NodeCoord) -> EdgeCoord {
        game.found_settlement(colour, node);
        let edge = game.board.edges_of(&node)[0];
        game.lay_road(colour, edge);
        edge
    }

    #[test]
    fn test_new_game_starts_in_setup() {
        let game = two_player_game(1);
        assert_eq!(
            game.phase(),
            &GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement
            }
        );
        assert_eq!(game.current_player(), Colour::Red);
        assert_eq!(game.dev_cards_remaining(), 25);
        assert!(game
            .legal_actions(Colour::Red)
            .iter()
            .all(|a| matches!(a, GameAction::BuildSettlement(_))));
        assert!(game.legal_actions(Colour::Blue).is_empty());
    }

    #[test]
    fn test_player_validation() {
        let solo = GameState::new(seats(&[Colour::Red]), 1, GameRules::default());
        assert_eq!(solo.unwrap_err(), GameError::InvalidPlayers);

        let twins = GameState::new(seats(&[Colour::Red, Colour::Red]), 1, GameRules::default());
        assert_eq!(twins.unwrap_err(), GameError::InvalidPlayers);

        let five = vec![(Colour::Red, "x".to_string()); 5];
        assert!(GameState::new(five, 1, GameRules::default()).is_err());
    }

    #[test]
    fn test_snake_setup_order() {
        let mut game = GameState::new(
            seats(&[Colour::Red, Colour::Blue, Colour::Orange]),
            3,
            GameRules::default(),
        )
        .unwrap();

        let settlers = finish_setup(&mut game);
        assert_eq!(
            settlers,
            vec![
                Colour::Red,
                Colour::Blue,
                Colour::Orange,
                Colour::Orange,
                Colour::Blue,
                Colour::Red
            ]
        );
        assert_eq!(game.phase(), &GamePhase::Rolling);
        assert_eq!(game.current_player(), Colour::Red);
        assert_eq!(game.turn_number(), 1);
        for player in game.players() {
            assert_eq!(player.settlements.len(), 2);
            assert_eq!(player.roads.len(), 2);
            assert_eq!(player.victory_points(), 2);
        }
    }

    #[test]
    fn test_second_settlement_grants_resources() {
        let mut game = two_player_game(9);
        finish_setup(&mut game);

        for player in game.players() {
            // Only the round-two settlement pays out
            let second = player.settlements.iter().copied().find(|node| {
                let produced: u32 = game
                    .board
                    .hexes_of(node)
                    .iter()
                    .filter(|h| game.board.tile(h).and_then(|t| t.resource()).is_some())
                    .count() as u32;
                produced == player.hand.total()
            });
            assert!(second.is_some(), "{} received the wrong income", player.colour);
        }
    }

    #[test]
    fn test_setup_road_must_touch_new_settlement() {
        let mut game = two_player_game(4);
        let node = game.board.valid_settlement_spots(Colour::Red, true)[0];
        game.apply(Colour::Red, GameAction::BuildSettlement(node)).unwrap();

        let far_edge = game
            .board
            .topology()
            .edges()
            .iter()
            .copied()
            .find(|e| !game.board.topology().nodes_of_edge(e).contains(&node))
            .unwrap();
        let err = game.apply(Colour::Red, GameAction::BuildRoad(far_edge)).unwrap_err();
        assert!(matches!(err, GameError::IllegalPlacement(_)));

        // Wrong piece for this step
        let other = game.board.valid_settlement_spots(Colour::Red, true)[0];
        assert_eq!(
            game.apply(Colour::Red, GameAction::BuildSettlement(other)),
            Err(GameError::InvalidPhase)
        );
    }

    #[test]
    fn test_not_your_turn() {
        let mut game = two_player_game(2);
        let node = game.board.valid_settlement_spots(Colour::Blue, true)[0];
        assert_eq!(
            game.apply(Colour::Blue, GameAction::BuildSettlement(node)),
            Err(GameError::NotYourTurn)
        );
        assert_eq!(
            game.apply(Colour::White, GameAction::EndTurn),
            Err(GameError::UnknownPlayer(Colour::White))
        );
    }

    #[test]
    fn test_scenario_settlement_then_city_production() {
        let (mut game, hex) = game_with_tile(Resource::Grain, 8);
        let node = free_corner(&game.board, &hex);

        // Road leading to the node so the build is connected
        let edge = game.board.edges_of(&node)[0];
        game.lay_road(Colour::Red, edge);
        game.ledger.grant(Colour::Red, &costs::settlement());
        game.apply(Colour::Red, GameAction::BuildSettlement(node)).unwrap();
        assert!(game.ledger.hand(Colour::Red).is_empty());

        game.apply(Colour::Red, GameAction::EndTurn).unwrap();
        let events = game.roll_with(Colour::Blue, (4, 4)).unwrap();
        assert!(events.contains(&GameEvent::ResourceGranted {
            colour: Colour::Red,
            resource: Resource::Grain,
            amount: 1,
            roll: Some(8),
        }));
        assert_eq!(game.ledger.hand(Colour::Red).grain, 1);

        // Upgrade to a city on Red's next turn
        game.apply(Colour::Blue, GameAction::EndTurn).unwrap();
        game.roll_with(Colour::Red, (1, 2)).unwrap();
        game.ledger.grant(Colour::Red, &costs::city());
        game.apply(Colour::Red, GameAction::BuildCity(node)).unwrap();
        assert_eq!(game.board.structure_at(&node).unwrap().tier, Tier::City);
        game.apply(Colour::Red, GameAction::EndTurn).unwrap();

        let grain_before = game.ledger.hand(Colour::Red).grain;
        let events = game.roll_with(Colour::Blue, (3, 5)).unwrap();
        assert!(events.contains(&GameEvent::ResourceGranted {
            colour: Colour::Red,
            resource: Resource::Grain,
            amount: 2,
            roll: Some(8),
        }));
        assert_eq!(game.ledger.hand(Colour::Red).grain, grain_before + 2);
    }

    #[test]
    fn test_scenario_road_without_resources() {
        let mut game = main_phase(5);
        let node = free_corner(&game.board, &HexCoord::new(0, 0));
        let built = settle(&mut game, Colour::Red, node);
        let roads_before = game.board.roads();

        let edge = *game
            .board
            .edges_of(&node)
            .iter()
            .find(|e| **e != built)
            .unwrap();
        let err = game.apply(Colour::Red, GameAction::BuildRoad(edge)).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientResources {
                resource: Resource::Brick,
                have: 0,
                need: 1
            }
        );
        assert_eq!(game.board.roads(), roads_before);
        assert_eq!(game.player(Colour::Red).unwrap().roads.len(), 1);
        assert_eq!(game.phase(), &GamePhase::AwaitingMove);
    }

    #[test]
    fn test_scenario_seven_requires_robber_first() {
        let mut game = main_phase(6);
        game.phase = GamePhase::Rolling;
        let node = free_corner(&game.board, &HexCoord::new(0, 0));
        let road = settle(&mut game, Colour::Red, node);
        game.ledger.grant(Colour::Red, &ResourceHand::with_amounts(3, 3, 0, 0, 0));

        let events = game.roll_with(Colour::Red, (3, 4)).unwrap();
        assert_eq!(game.phase(), &GamePhase::RobberPlacement);
        assert!(!events
            .iter()
            .any(|e| matches!(e, GameEvent::ResourceGranted { .. })));

        let next_road = game.board.valid_road_spots(Colour::Red)[0];
        assert_ne!(next_road, road);
        for action in [
            GameAction::BuildRoad(next_road),
            GameAction::EndTurn,
            GameAction::RollDice,
            GameAction::BuyDevelopmentCard,
        ] {
            assert_eq!(game.apply(Colour::Red, action), Err(GameError::InvalidPhase));
        }

        let target = game
            .board
            .tiles()
            .find(|t| t.coord != game.board.robber_location())
            .map(|t| t.coord)
            .unwrap();
        let events = game
            .apply(
                Colour::Red,
                GameAction::MoveRobber {
                    hex: target,
                    victim: None,
                },
            )
            .unwrap();
        assert!(matches!(events[0], GameEvent::RobberMoved { .. }));
        assert_eq!(game.board.robber_location(), target);
        assert_eq!(game.phase(), &GamePhase::AwaitingMove);
        assert!(game.apply(Colour::Red, GameAction::BuildRoad(next_road)).is_ok());
    }

    #[test]
    fn test_discard_on_seven() {
        let mut game = main_phase(7);
        game.phase = GamePhase::Rolling;
        game.ledger.grant(Colour::Blue, &ResourceHand::with_amounts(3, 3, 3, 0, 0));
        game.ledger.grant(Colour::Red, &ResourceHand::with_amounts(1, 1, 1, 1, 1));

        game.roll_with(Colour::Red, (6, 1)).unwrap();
        assert_eq!(
            game.phase(),
            &GamePhase::Discarding {
                remaining: vec![Colour::Blue]
            }
        );
        assert_eq!(game.pending_actor(), Some(Colour::Blue));
        assert_eq!(
            game.apply(Colour::Red, GameAction::Discard(ResourceHand::new())),
            Err(GameError::NotYourTurn)
        );
        assert_eq!(
            game.apply(
                Colour::Blue,
                GameAction::Discard(ResourceHand::single(Resource::Brick, 3))
            ),
            Err(GameError::InvalidDiscard)
        );

        let suggested = game.legal_actions(Colour::Blue);
        assert_eq!(suggested.len(), 1);
        let events = game.apply(Colour::Blue, suggested[0].clone()).unwrap();
        assert_eq!(
            events,
            vec![GameEvent::CardsDiscarded {
                colour: Colour::Blue,
                count: 4
            }]
        );
        assert_eq!(game.ledger.hand(Colour::Blue).total(), 5);
        assert_eq!(game.phase(), &GamePhase::RobberPlacement);
        assert_eq!(game.pending_actor(), Some(Colour::Red));
    }

    #[test]
    fn test_robber_victim_rules() {
        let mut game = main_phase(8);
        game.phase = GamePhase::RobberPlacement;
        let hex = game
            .board
            .tiles()
            .find(|t| t.coord != game.board.robber_location())
            .map(|t| t.coord)
            .unwrap();
        let corners = game.board.topology().nodes_of_hex(&hex).to_vec();
        game.found_settlement(Colour::Blue, corners[0]);

        // Blue has nothing to steal, so no victim is needed
        assert_eq!(game.robber_victim(Colour::Red, hex, None), Ok(None));
        assert_eq!(
            game.robber_victim(Colour::Red, hex, Some(Colour::Blue)),
            Err(GameError::InvalidRobberTarget)
        );
        assert_eq!(
            game.robber_victim(Colour::Red, game.board.robber_location(), None),
            Err(GameError::InvalidRobberTarget)
        );

        game.ledger.grant(Colour::Blue, &ResourceHand::single(Resource::Wool, 1));
        assert_eq!(game.robber_victim(Colour::Red, hex, None), Ok(Some(Colour::Blue)));

        let events = game
            .apply(
                Colour::Red,
                GameAction::MoveRobber {
                    hex,
                    victim: None,
                },
            )
            .unwrap();
        assert_eq!(
            events[1],
            GameEvent::ResourceStolen {
                thief: Colour::Red,
                victim: Colour::Blue,
                resource: Some(Resource::Wool)
            }
        );
        assert_eq!(game.ledger.hand(Colour::Red).wool, 1);
    }

    #[test]
    fn test_victim_required_with_two_candidates() {
        let mut game = GameState::new(
            seats(&[Colour::Red, Colour::Blue, Colour::White]),
            8,
            GameRules::default(),
        )
        .unwrap();
        game.phase = GamePhase::RobberPlacement;
        let hex = HexCoord::new(0, 0);
        if hex == game.board.robber_location() {
            game.board.move_robber(HexCoord::new(1, 0));
        }
        let corners = game.board.topology().nodes_of_hex(&hex).to_vec();
        let spots: Vec<NodeCoord> = corners
            .iter()
            .copied()
            .filter(|n| !game.board.topology().adjacent_nodes(&corners[0]).contains(n))
            .collect();
        game.found_settlement(Colour::Blue, spots[0]);
        game.found_settlement(Colour::White, spots[1]);
        game.ledger.grant(Colour::Blue, &ResourceHand::single(Resource::Ore, 1));
        game.ledger.grant(Colour::White, &ResourceHand::single(Resource::Ore, 1));

        assert_eq!(
            game.apply(
                Colour::Red,
                GameAction::MoveRobber {
                    hex,
                    victim: None
                }
            ),
            Err(GameError::VictimRequired)
        );
        let moves = game.legal_actions(Colour::Red);
        assert!(moves.contains(&GameAction::MoveRobber {
            hex,
            victim: Some(Colour::White)
        }));
        assert!(game
            .apply(
                Colour::Red,
                GameAction::MoveRobber {
                    hex,
                    victim: Some(Colour::White)
                }
            )
            .is_ok());
    }

    #[test]
    fn test_scenario_city_reaches_ten_points() {
        let mut game = main_phase(10);
        for _ in 0..5 {
            let node = game.board.valid_settlement_spots(Colour::Red, true)[0];
            game.found_settlement(Colour::Red, node);
        }
        game.player_mut(Colour::Red)
            .unwrap()
            .dev_cards
            .extend([DevelopmentCard::VictoryPoint; 4]);
        assert_eq!(game.victory_points(Colour::Red), 9);

        let node = game.board.valid_city_spots(Colour::Red)[0];
        game.ledger.grant(Colour::Red, &costs::city());
        let events = game.apply(Colour::Red, GameAction::BuildCity(node)).unwrap();

        assert_eq!(
            events.last(),
            Some(&GameEvent::GameWon {
                colour: Colour::Red,
                victory_points: 10
            })
        );
        assert_eq!(game.winner(), Some(Colour::Red));
        assert_eq!(game.pending_actor(), None);
        assert!(game.legal_actions(Colour::Red).is_empty());
        assert_eq!(game.apply(Colour::Red, GameAction::EndTurn), Err(GameError::GameOver));
        assert_eq!(game.apply(Colour::Blue, GameAction::RollDice), Err(GameError::GameOver));
        assert_eq!(game.roll_with(Colour::Blue, (2, 2)), Err(GameError::GameOver));
    }

    #[test]
    fn test_city_needs_own_settlement() {
        let mut game = main_phase(11);
        game.ledger.grant(Colour::Red, &costs::city());
        let node = free_corner(&game.board, &HexCoord::new(0, 0));
        assert_eq!(
            game.apply(Colour::Red, GameAction::BuildCity(node)),
            Err(GameError::InvalidUpgrade)
        );
        game.found_settlement(Colour::Blue, node);
        assert_eq!(
            game.apply(Colour::Red, GameAction::BuildCity(node)),
            Err(GameError::InvalidUpgrade)
        );
        assert_eq!(game.ledger.hand(Colour::Red), costs::city());
    }

    #[test]
    fn test_invalid_dice() {
        let mut game = main_phase(12);
        game.phase = GamePhase::Rolling;
        assert_eq!(game.roll_with(Colour::Red, (0, 3)), Err(GameError::InvalidDice));
        assert_eq!(game.roll_with(Colour::Red, (3, 7)), Err(GameError::InvalidDice));
        assert_eq!(game.roll_with(Colour::Blue, (3, 3)), Err(GameError::NotYourTurn));
    }

    #[test]
    fn test_bank_trade_rates() {
        let mut game = main_phase(13);
        assert_eq!(game.bank_rate(Colour::Red, Resource::Brick), 4);

        game.ledger.grant(Colour::Red, &ResourceHand::single(Resource::Brick, 4));
        let three_for_one = TradeOffer::new(
            Colour::Red,
            TradePartner::Bank,
            ResourceHand::single(Resource::Brick, 3),
            ResourceHand::single(Resource::Ore, 1),
        );
        assert_eq!(
            game.apply(Colour::Red, GameAction::ProposeTrade(three_for_one)),
            Err(GameError::InvalidTrade)
        );

        let four_for_one = TradeOffer::new(
            Colour::Red,
            TradePartner::Bank,
            ResourceHand::single(Resource::Brick, 4),
            ResourceHand::single(Resource::Ore, 1),
        );
        game.apply(Colour::Red, GameAction::ProposeTrade(four_for_one)).unwrap();
        assert_eq!(game.ledger.hand(Colour::Red), ResourceHand::single(Resource::Ore, 1));

        // A harbour improves the rate
        let placement = game.board.harbors()[0].clone();
        let end = game.board.topology().nodes_of_edge(&placement.edge)[0];
        game.found_settlement(Colour::Red, end);
        let expected = placement.harbor.rate();
        let resource = match placement.harbor {
            Harbor::Specific(r) => r,
            Harbor::Generic => Resource::Wool,
        };
        assert_eq!(game.bank_rate(Colour::Red, resource), expected);
    }

    #[test]
    fn test_player_trade() {
        let mut game = main_phase(14);
        game.ledger.grant(Colour::Red, &ResourceHand::single(Resource::Lumber, 2));
        game.ledger.grant(Colour::Blue, &ResourceHand::single(Resource::Ore, 1));

        let offer = TradeOffer::new(
            Colour::Red,
            TradePartner::Player(Colour::Blue),
            ResourceHand::single(Resource::Lumber, 2),
            ResourceHand::single(Resource::Ore, 1),
        );
        game.apply(Colour::Red, GameAction::ProposeTrade(offer.clone())).unwrap();
        assert_eq!(game.pending_actor(), Some(Colour::Blue));
        assert_eq!(game.apply(Colour::Red, GameAction::EndTurn), Err(GameError::InvalidPhase));
        assert_eq!(
            game.apply(Colour::Red, GameAction::RespondToTrade { accept: true }),
            Err(GameError::NotYourTurn)
        );

        game.apply(Colour::Blue, GameAction::RespondToTrade { accept: true })
            .unwrap();
        assert_eq!(game.ledger.hand(Colour::Red), ResourceHand::single(Resource::Ore, 1));
        assert_eq!(
            game.ledger.hand(Colour::Blue),
            ResourceHand::single(Resource::Lumber, 2)
        );
        assert_eq!(game.phase(), &GamePhase::AwaitingMove);

        // Offer to self is rejected
        let to_self = TradeOffer {
            to: TradePartner::Player(Colour::Red),
            offering: ResourceHand::single(Resource::Ore, 1),
            ..offer
        };
        assert_eq!(
            game.apply(Colour::Red, GameAction::ProposeTrade(to_self)),
            Err(GameError::InvalidTrade)
        );
    }

    #[test]
    fn test_declined_trade() {
        let mut game = main_phase(15);
        game.ledger.grant(Colour::Red, &ResourceHand::single(Resource::Grain, 1));
        let offer = TradeOffer::new(
            Colour::Red,
            TradePartner::Player(Colour::Blue),
            ResourceHand::single(Resource::Grain, 1),
            ResourceHand::single(Resource::Wool, 1),
        );
        game.apply(Colour::Red, GameAction::ProposeTrade(offer)).unwrap();

        // Blue has no wool, so only declining is offered
        assert_eq!(
            game.legal_actions(Colour::Blue),
            vec![GameAction::RespondToTrade { accept: false }]
        );
        let events = game
            .apply(Colour::Blue, GameAction::RespondToTrade { accept: false })
            .unwrap();
        assert_eq!(
            events,
            vec![GameEvent::TradeDeclined {
                from: Colour::Red,
                by: Colour::Blue
            }]
        );
        assert_eq!(game.ledger.hand(Colour::Red).grain, 1);
    }

    #[test]
    fn test_development_cards() {
        let mut game = main_phase(16);
        game.ledger.grant(Colour::Red, &costs::development_card());
        let events = game.apply(Colour::Red, GameAction::BuyDevelopmentCard).unwrap();
        assert!(matches!(
            events[0],
            GameEvent::DevelopmentCardBought { card: Some(_), .. }
        ));
        assert_eq!(game.dev_cards_remaining(), 24);

        // Fresh cards wait a turn
        let bought = game.player(Colour::Red).unwrap().dev_cards_bought_this_turn[0];
        if bought.is_playable() {
            let play = match bought {
                DevelopmentCard::Monopoly => DevelopmentPlay::Monopoly(Resource::Ore),
                DevelopmentCard::YearOfPlenty => {
                    DevelopmentPlay::YearOfPlenty(Resource::Ore, Resource::Ore)
                }
                DevelopmentCard::RoadBuilding => {
                    let edge = game.board.topology().edges()[0];
                    DevelopmentPlay::RoadBuilding(edge, Some(edge))
                }
                _ => DevelopmentPlay::Knight {
                    hex: HexCoord::new(0, 0),
                    victim: None,
                },
            };
            assert_eq!(
                game.apply(Colour::Red, GameAction::PlayDevelopmentCard(play)),
                Err(GameError::CardNotPlayable)
            );
        }

        assert_eq!(
            game.apply(
                Colour::Red,
                GameAction::PlayDevelopmentCard(DevelopmentPlay::Monopoly(Resource::Ore))
            )
            .unwrap_err(),
            if bought == DevelopmentCard::Monopoly {
                GameError::CardNotPlayable
            } else {
                GameError::NoSuchCard
            }
        );
    }

    #[test]
    fn test_year_of_plenty_and_monopoly() {
        let mut game = main_phase(17);
        game.player_mut(Colour::Red)
            .unwrap()
            .dev_cards
            .extend([DevelopmentCard::YearOfPlenty, DevelopmentCard::Monopoly]);
        game.ledger.grant(Colour::Blue, &ResourceHand::single(Resource::Wool, 3));

        game.apply(
            Colour::Red,
            GameAction::PlayDevelopmentCard(DevelopmentPlay::YearOfPlenty(
                Resource::Wool,
                Resource::Wool,
            )),
        )
        .unwrap();
        assert_eq!(game.ledger.hand(Colour::Red).wool, 2);

        // One card per turn
        assert_eq!(
            game.apply(
                Colour::Red,
                GameAction::PlayDevelopmentCard(DevelopmentPlay::Monopoly(Resource::Wool))
            ),
            Err(GameError::CardNotPlayable)
        );

        game.apply(Colour::Red, GameAction::EndTurn).unwrap();
        game.roll_with(Colour::Blue, (1, 1)).unwrap();
        game.apply(Colour::Blue, GameAction::EndTurn).unwrap();
        game.roll_with(Colour::Red, (1, 1)).unwrap();

        let events = game
            .apply(
                Colour::Red,
                GameAction::PlayDevelopmentCard(DevelopmentPlay::Monopoly(Resource::Wool)),
            )
            .unwrap();
        assert!(events.contains(&GameEvent::MonopolyCollected {
            colour: Colour::Red,
            resource: Resource::Wool,
            total: 3
        }));
        assert_eq!(game.ledger.hand(Colour::Red).wool, 5);
        assert_eq!(game.ledger.hand(Colour::Blue).wool, 0);
    }

    #[test]
    fn test_knight_before_rolling_and_largest_army() {
        let mut game = main_phase(18);
        game.phase = GamePhase::Rolling;
        game.player_mut(Colour::Red)
            .unwrap()
            .dev_cards
            .push(DevelopmentCard::Knight);

        let knight = game
            .legal_actions(Colour::Red)
            .into_iter()
            .find(|a| matches!(a, GameAction::PlayDevelopmentCard(_)))
            .expect("knight is offered before rolling");
        let events = game.apply(Colour::Red, knight).unwrap();
        assert!(events.contains(&GameEvent::DevelopmentCardPlayed {
            colour: Colour::Red,
            card: DevelopmentCard::Knight
        }));
        assert_eq!(game.phase(), &GamePhase::Rolling);
        assert_eq!(game.player(Colour::Red).unwrap().knights_played, 1);

        // Largest army needs three knights, and strictly more to take it over
        game.player_mut(Colour::Red).unwrap().knights_played = 3;
        assert_eq!(game.update_largest_army(Colour::Red).len(), 1);
        assert!(game.player(Colour::Red).unwrap().has_largest_army);

        game.player_mut(Colour::Blue).unwrap().knights_played = 3;
        assert!(game.update_largest_army(Colour::Blue).is_empty());

        game.player_mut(Colour::Blue).unwrap().knights_played = 4;
        assert_eq!(
            game.update_largest_army(Colour::Blue),
            vec![GameEvent::LargestArmyChanged {
                previous: Some(Colour::Red),
                current: Some(Colour::Blue),
                knights: 4
            }]
        );
        assert_eq!(game.victory_points(Colour::Blue), 2);
        assert_eq!(game.victory_points(Colour::Red), 0);
    }

    /// An unused edge that would stretch `colour`'s longest road to `target`
    fn extension(game: &GameState, colour: Colour, target: u32) -> EdgeCoord {
        game.board
            .topology()
            .edges()
            .iter()
            .copied()
            .find(|e| {
                let mut board = game.board.clone();
                board.road_at(e).is_none() && {
                    board.place_road(*e, colour);
                    board.longest_road(colour, true) == target
                }
            })
            .expect("road can be extended")
    }

    #[test]
    fn test_longest_road_tie_keeps_holder() {
        let mut game = main_phase(19);
        for side in HexCoord::new(0, 0).sides().into_iter().take(5) {
            game.lay_road(Colour::Red, side);
        }
        assert_eq!(
            game.update_longest_road(),
            vec![GameEvent::LongestRoadChanged {
                previous: None,
                current: Some(Colour::Red),
                length: 5
            }]
        );

        for side in HexCoord::new(2, -1).sides().into_iter().take(5) {
            game.lay_road(Colour::Blue, side);
        }
        assert!(game.update_longest_road().is_empty());
        assert!(game.player(Colour::Red).unwrap().has_longest_road);
        assert_eq!(game.player(Colour::Blue).unwrap().longest_road, 5);

        let edge = extension(&game, Colour::Blue, 6);
        game.lay_road(Colour::Blue, edge);
        assert_eq!(
            game.update_longest_road(),
            vec![GameEvent::LongestRoadChanged {
                previous: Some(Colour::Red),
                current: Some(Colour::Blue),
                length: 6
            }]
        );
        assert_eq!(game.victory_points(Colour::Blue), 2);
    }

    #[test]
    fn test_longest_road_tie_without_holder() {
        let mut game = main_phase(20);
        for side in HexCoord::new(0, 0).sides().into_iter().take(5) {
            game.lay_road(Colour::Red, side);
        }
        for side in HexCoord::new(2, -1).sides().into_iter().take(5) {
            game.lay_road(Colour::Blue, side);
        }
        assert!(game.update_longest_road().is_empty());
        assert!(game.players().iter().all(|p| !p.has_longest_road));
    }

    #[test]
    fn test_settlement_breaks_longest_road() {
        let mut game = main_phase(21);
        let start = HexCoord::new(0, 0).corners()[0];
        let path = road_chain(&mut game.board, Colour::Red, start, 5);
        for player in game.ledger.players_mut() {
            if player.colour == Colour::Red {
                player.roads = game.board.roads().into_iter().map(|(e, _)| e).collect();
            }
        }
        game.update_longest_road();
        assert!(game.player(Colour::Red).unwrap().has_longest_road);

        // Blue builds in the middle of Red's road
        game.found_settlement(Colour::Blue, path[2]);
        let events = game.update_longest_road();
        assert_eq!(
            events,
            vec![GameEvent::LongestRoadChanged {
                previous: Some(Colour::Red),
                current: None,
                length: 0
            }]
        );
        assert_eq!(game.player(Colour::Red).unwrap().longest_road, 3);
    }

    #[test]
    fn test_building_in_main_phase() {
        let mut game = main_phase(22);
        let node = free_corner(&game.board, &HexCoord::new(0, 0));
        settle(&mut game, Colour::Red, node);
        game.ledger.grant(Colour::Red, &ResourceHand::with_amounts(5, 5, 0, 0, 0));

        let actions = game.legal_actions(Colour::Red);
        let road = actions
            .iter()
            .find_map(|a| match a {
                GameAction::BuildRoad(e) => Some(*e),
                _ => None,
            })
            .unwrap();
        assert_eq!(actions.last(), Some(&GameAction::EndTurn));
        assert!(actions.iter().any(|a| matches!(
            a,
            GameAction::ProposeTrade(TradeOffer {
                to: TradePartner::Bank,
                ..
            })
        )));

        let events = game.apply(Colour::Red, GameAction::BuildRoad(road)).unwrap();
        assert_eq!(
            events,
            vec![GameEvent::RoadBuilt {
                colour: Colour::Red,
                edge: road
            }]
        );
        assert_eq!(game.player(Colour::Red).unwrap().roads_remaining(), 13);
        assert_eq!(game.ledger.hand(Colour::Red), ResourceHand::with_amounts(4, 4, 0, 0, 0));

        // Blocked spot
        let taken = game.board.edges_of(&node)[0];
        assert_eq!(
            game.apply(Colour::Red, GameAction::BuildRoad(taken)),
            Err(GameError::IllegalPlacement(PlacementError::Occupied))
        );
    }

    #[test]
    fn test_road_building_card() {
        let mut game = main_phase(23);
        let node = free_corner(&game.board, &HexCoord::new(0, 0));
        settle(&mut game, Colour::Red, node);
        game.player_mut(Colour::Red)
            .unwrap()
            .dev_cards
            .push(DevelopmentCard::RoadBuilding);

        let play = game
            .legal_actions(Colour::Red)
            .into_iter()
            .find(|a| {
                matches!(
                    a,
                    GameAction::PlayDevelopmentCard(DevelopmentPlay::RoadBuilding(..))
                )
            })
            .unwrap();
        let events = game.apply(Colour::Red, play).unwrap();
        let built = events
            .iter()
            .filter(|e| matches!(e, GameEvent::RoadBuilt { .. }))
            .count();
        assert_eq!(built, 2);
        assert_eq!(game.player(Colour::Red).unwrap().roads.len(), 3);
        assert!(game.ledger.hand(Colour::Red).is_empty());
    }

    #[test]
    fn test_road_building_with_one_piece_left() {
        let mut game = main_phase(23);
        let node = free_corner(&game.board, &HexCoord::new(0, 0));
        settle(&mut game, Colour::Red, node);
        game.player_mut(Colour::Red)
            .unwrap()
            .dev_cards
            .push(DevelopmentCard::RoadBuilding);

        // Use up all but one road piece on the ledger side
        let spare: Vec<EdgeCoord> = game
            .board
            .topology()
            .edges()
            .iter()
            .copied()
            .filter(|e| !game.player(Colour::Red).unwrap().roads.contains(e))
            .take((ROAD_PIECES - 2) as usize)
            .collect();
        game.player_mut(Colour::Red).unwrap().roads.extend(spare);
        assert_eq!(game.player(Colour::Red).unwrap().roads_remaining(), 1);

        let first = game.board.valid_road_spots(Colour::Red)[0];
        let second = game
            .board
            .topology()
            .edges()
            .iter()
            .copied()
            .find(|e| game.board.check_road(Colour::Red, e, Some(&first)).is_ok())
            .unwrap();
        assert_eq!(
            game.apply(
                Colour::Red,
                GameAction::PlayDevelopmentCard(DevelopmentPlay::RoadBuilding(first, Some(second)))
            ),
            Err(GameError::NoPiecesRemaining)
        );

        let single = GameAction::PlayDevelopmentCard(DevelopmentPlay::RoadBuilding(first, None));
        assert!(game.legal_actions(Colour::Red).contains(&single));
        let events = game.apply(Colour::Red, single).unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GameEvent::RoadBuilt { .. }))
                .count(),
            1
        );
        assert_eq!(game.player(Colour::Red).unwrap().roads_remaining(), 0);
    }

    #[test]
    fn test_setup_roads_refresh_road_length() {
        let mut game = two_player_game(31);
        let settlement = game.legal_actions(Colour::Red).remove(0);
        game.apply(Colour::Red, settlement).unwrap();
        assert_eq!(game.player(Colour::Red).unwrap().longest_road, 0);

        let road = game.legal_actions(Colour::Red).remove(0);
        game.apply(Colour::Red, road).unwrap();
        assert_eq!(game.player(Colour::Red).unwrap().longest_road, 1);
    }

    #[test]
    fn test_end_turn_unlocks_cards() {
        let mut game = main_phase(24);
        game.player_mut(Colour::Red)
            .unwrap()
            .dev_cards_bought_this_turn
            .push(DevelopmentCard::Knight);

        let events = game.apply(Colour::Red, GameAction::EndTurn).unwrap();
        assert_eq!(
            events,
            vec![GameEvent::TurnChanged {
                colour: Colour::Blue,
                turn_number: 2
            }]
        );
        let red = game.player(Colour::Red).unwrap();
        assert_eq!(red.dev_cards, vec![DevelopmentCard::Knight]);
        assert!(red.dev_cards_bought_this_turn.is_empty());
        assert_eq!(game.phase(), &GamePhase::Rolling);
        assert_eq!(game.dice_roll(), None);
    }

    #[test]
    fn test_json_resume() {
        let mut game = two_player_game(25);
        finish_setup(&mut game);

        let json = serde_json::to_string(&game).unwrap();
        let mut resumed: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&resumed).unwrap(), json);

        // Same RNG state means the same dice
        let original = game.apply(Colour::Red, GameAction::RollDice);
        let replayed = resumed.apply(Colour::Red, GameAction::RollDice);
        assert_eq!(original, replayed);
        assert_eq!(resumed.phase(), game.phase());
        assert_eq!(resumed.ledger(), game.ledger());
    }

    #[test]
    fn test_rules_default_from_partial_json() {
        let rules: GameRules = serde_json::from_str(r#"{"victory_points_to_win": 6}"#).unwrap();
        assert_eq!(rules.victory_points_to_win, 6);
        assert_eq!(rules.min_longest_road, 5);
        assert!(rules.settlements_break_roads);
    }
}
