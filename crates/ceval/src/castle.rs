//! Castling notation fix-up for outgoing engine requests.

/// Moves are stored king-takes-rook (`e1h1`) when read from the server, but
/// the engine expects the king's destination square (`e1g1`). Only moves
/// notated as castling are rewritten; a rook on e1 going to h1 is left alone.
pub fn normalize_castle<'a>(uci: &'a str, san: Option<&str>) -> &'a str {
    if !san.is_some_and(|san| san.starts_with("O-O")) {
        return uci;
    }
    match uci {
        "e1h1" => "e1g1",
        "e1a1" => "e1c1",
        "e8h8" => "e8g8",
        "e8a8" => "e8c8",
        _ => uci,
    }
}
