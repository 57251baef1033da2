//! Rules engine collaborator: move legality, notation and position facts.

use std::future::Future;

use game_tree::{Color, Dests, Ply, SituationData};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{Chess, EnPassantMode, Position};

use crate::error::{RulesError, RulesResult};
use crate::variant::Variant;

/// Request/response access to move legality. Calls may be answered
/// asynchronously; the coordinator never blocks on them.
pub trait RulesEngine: Send + Sync + 'static {
    /// Play `uci` (a move like `e7e8q` or a drop like `N@f3`) on `fen`.
    fn play(
        &self,
        variant: Variant,
        fen: &str,
        uci: &str,
    ) -> impl Future<Output = RulesResult<SituationData>> + Send;

    /// Facts about `fen` itself, used to fill destinations lazily.
    fn situation(
        &self,
        variant: Variant,
        fen: &str,
    ) -> impl Future<Output = RulesResult<SituationData>> + Send;
}

/// Local rules engine backed by shakmaty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    pub fn play_sync(&self, variant: Variant, fen: &str, uci: &str) -> RulesResult<SituationData> {
        let is_drop = uci.contains('@');
        let illegal = || {
            if is_drop {
                RulesError::IllegalDrop(uci.to_string())
            } else {
                RulesError::IllegalMove(uci.to_string())
            }
        };

        let mut pos = load_position(variant, fen)?;
        let uci_move: UciMove = uci.parse().map_err(|_| illegal())?;
        let mv = uci_move.to_move(&pos).map_err(|_| illegal())?;
        let played = mv.to_uci(variant.castling_mode()).to_string();
        let san = SanPlus::from_move_and_play_unchecked(&mut pos, mv).to_string();

        let mut data = describe(variant, &pos);
        data.uci = Some(played);
        data.san = Some(san);
        Ok(data)
    }

    pub fn situation_sync(&self, variant: Variant, fen: &str) -> RulesResult<SituationData> {
        let pos = load_position(variant, fen)?;
        Ok(describe(variant, &pos))
    }
}

impl RulesEngine for ShakmatyRules {
    async fn play(&self, variant: Variant, fen: &str, uci: &str) -> RulesResult<SituationData> {
        self.play_sync(variant, fen, uci)
    }

    async fn situation(&self, variant: Variant, fen: &str) -> RulesResult<SituationData> {
        self.situation_sync(variant, fen)
    }
}

fn load_position(variant: Variant, fen: &str) -> RulesResult<Chess> {
    let parsed: Fen = fen
        .parse()
        .map_err(|_| RulesError::InvalidFen(fen.to_string()))?;
    parsed
        .into_position(variant.castling_mode())
        .map_err(|_| RulesError::InvalidFen(fen.to_string()))
}

fn describe(variant: Variant, pos: &Chess) -> SituationData {
    let mut dests = Dests::new();
    for mv in pos.legal_moves() {
        if let UciMove::Normal { from, to, .. } = mv.to_uci(variant.castling_mode()) {
            let targets = dests.entry(from.to_string()).or_default();
            let to = to.to_string();
            if !targets.contains(&to) {
                targets.push(to);
            }
        }
    }

    let turn = pos.turn();
    let ply: Ply = (pos.fullmoves().get() - 1)
        .saturating_mul(2)
        .saturating_add(Ply::from(turn.is_black()));

    SituationData {
        ply,
        fen: Fen::from_position(pos, EnPassantMode::Legal).to_string(),
        uci: None,
        san: None,
        dests: Some(dests),
        drops: None,
        check: pos.is_check(),
        end: Some(pos.is_game_over()),
        player: if turn.is_white() {
            Color::White
        } else {
            Color::Black
        },
    }
}
