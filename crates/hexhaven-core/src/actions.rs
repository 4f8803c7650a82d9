//! Moves players submit and the events applying them produces.
//!
//! Every move is validated by the game state machine; events describe what
//! actually changed and are safe to broadcast once passed through
//! [`GameEvent::redacted_for`].

use crate::board::Resource;
use crate::hex::{EdgeCoord, HexCoord, NodeCoord};
use crate::ledger::{Colour, DevelopmentCard, ResourceHand};
use serde::{Deserialize, Serialize};

/// All possible actions a player can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    /// Roll the dice (must be done at start of turn)
    RollDice,

    // ==================== Building ====================
    /// Build a road at an edge (free during setup)
    BuildRoad(EdgeCoord),
    /// Build a settlement at a node (free during setup)
    BuildSettlement(NodeCoord),
    /// Upgrade one of your settlements to a city
    BuildCity(NodeCoord),

    // ==================== Development Cards ====================
    /// Buy a development card from the deck
    BuyDevelopmentCard,
    /// Play a card bought on an earlier turn
    PlayDevelopmentCard(DevelopmentPlay),

    // ==================== Trading ====================
    /// Offer a trade to another colour or the bank
    ProposeTrade(TradeOffer),
    /// Answer the trade addressed to you
    RespondToTrade { accept: bool },

    // ==================== Robber ====================
    /// Move the robber after a 7, optionally naming who to steal from
    MoveRobber {
        hex: HexCoord,
        victim: Option<Colour>,
    },
    /// Cards given up after a 7 when holding too many
    Discard(ResourceHand),

    /// End your turn
    EndTurn,
}

/// A development card together with the choices it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevelopmentPlay {
    /// Move the robber and steal, counts toward Largest Army
    Knight {
        hex: HexCoord,
        victim: Option<Colour>,
    },
    /// Build up to 2 roads for free; the second may be left out
    RoadBuilding(EdgeCoord, Option<EdgeCoord>),
    /// Take 2 resources from the bank
    YearOfPlenty(Resource, Resource),
    /// Take every card of one kind from all opponents
    Monopoly(Resource),
}

impl DevelopmentPlay {
    /// The card this play consumes
    pub fn card(&self) -> DevelopmentCard {
        match self {
            DevelopmentPlay::Knight { .. } => DevelopmentCard::Knight,
            DevelopmentPlay::RoadBuilding(..) => DevelopmentCard::RoadBuilding,
            DevelopmentPlay::YearOfPlenty(..) => DevelopmentCard::YearOfPlenty,
            DevelopmentPlay::Monopoly(_) => DevelopmentCard::Monopoly,
        }
    }
}

/// Who a trade is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradePartner {
    Player(Colour),
    /// 4:1, or better through a harbour
    Bank,
}

/// A trade offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    /// Player making the offer
    pub from: Colour,
    pub to: TradePartner,
    /// Resources being offered
    pub offering: ResourceHand,
    /// Resources being requested
    pub requesting: ResourceHand,
}

impl TradeOffer {
    /// Create a new trade offer
    pub fn new(
        from: Colour,
        to: TradePartner,
        offering: ResourceHand,
        requesting: ResourceHand,
    ) -> Self {
        Self {
            from,
            to,
            offering,
            requesting,
        }
    }

    /// Check if offer is valid (non-empty on both sides)
    pub fn is_valid(&self) -> bool {
        !self.offering.is_empty() && !self.requesting.is_empty()
    }
}

/// Events that occur as a result of actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// Dice were rolled
    DiceRolled {
        colour: Colour,
        dice: (u8, u8),
        total: u8,
    },

    /// A player received resources. `roll` is set for dice production.
    ResourceGranted {
        colour: Colour,
        resource: Resource,
        amount: u32,
        roll: Option<u8>,
    },

    SettlementBuilt {
        colour: Colour,
        node: NodeCoord,
    },

    CityBuilt {
        colour: Colour,
        node: NodeCoord,
    },

    RoadBuilt {
        colour: Colour,
        edge: EdgeCoord,
    },

    /// A development card was bought; the card is only shown to the buyer
    DevelopmentCardBought {
        colour: Colour,
        card: Option<DevelopmentCard>,
    },

    DevelopmentCardPlayed {
        colour: Colour,
        card: DevelopmentCard,
    },

    /// Monopoly card collected `total` cards
    MonopolyCollected {
        colour: Colour,
        resource: Resource,
        total: u32,
    },

    /// The robber was moved
    RobberMoved {
        colour: Colour,
        from: HexCoord,
        to: HexCoord,
    },

    /// A resource was stolen
    ResourceStolen {
        thief: Colour,
        victim: Colour,
        resource: Option<Resource>, // Hidden from other players
    },

    /// Player had to discard cards
    CardsDiscarded { colour: Colour, count: u32 },

    /// A trade was offered to another colour
    TradeProposed { offer: TradeOffer },

    /// A trade was completed
    TradeCompleted {
        from: Colour,
        to: TradePartner,
        gave: ResourceHand,
        received: ResourceHand,
    },

    /// The recipient turned the offer down
    TradeDeclined { from: Colour, by: Colour },

    /// Longest road changed hands
    LongestRoadChanged {
        previous: Option<Colour>,
        current: Option<Colour>,
        length: u32,
    },

    /// Largest army changed hands
    LargestArmyChanged {
        previous: Option<Colour>,
        current: Option<Colour>,
        knights: u32,
    },

    /// Another colour is now expected to act
    TurnChanged { colour: Colour, turn_number: u32 },

    /// A player won the game
    GameWon {
        colour: Colour,
        victory_points: u32,
    },
}

impl GameEvent {
    /// The event as `viewer` is allowed to see it
    pub fn redacted_for(&self, viewer: Colour) -> GameEvent {
        match self {
            GameEvent::ResourceStolen {
                thief,
                victim,
                resource,
            } => GameEvent::ResourceStolen {
                thief: *thief,
                victim: *victim,
                resource: if viewer == *thief || viewer == *victim {
                    *resource
                } else {
                    None
                },
            },
            GameEvent::DevelopmentCardBought { colour, card } => GameEvent::DevelopmentCardBought {
                colour: *colour,
                card: if viewer == *colour { *card } else { None },
            },
            other => other.clone(),
        }
    }
}
