//! Logical key identifiers and their electrical addresses.
//!
//! Two address spaces coexist. The legacy crosspoint IC is addressed by
//! `(chip select, row, column)` from a static per-key table. Gtech
//! boards assign each key a flat chain id; the FPGA bank, lane and
//! address derive from it (see [`crate::gtech`]).

/// ANSI-layout key names, one per physical switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum KeyId {
    Escape = 0,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Grave,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Digit0,
    Minus,
    Equal,
    Backspace,
    Tab,
    Q,
    W,
    E,
    R,
    T,
    Y,
    U,
    I,
    O,
    P,
    LeftBracket,
    RightBracket,
    Backslash,
    CapsLock,
    A,
    S,
    D,
    F,
    G,
    H,
    J,
    K,
    L,
    Semicolon,
    Quote,
    Enter,
    LeftShift,
    Z,
    X,
    C,
    V,
    B,
    N,
    M,
    Comma,
    Period,
    Slash,
    RightShift,
    LeftCtrl,
    LeftMeta,
    LeftAlt,
    Space,
    RightAlt,
    Fn,
    Menu,
    RightCtrl,
    ArrowUp,
    ArrowLeft,
    ArrowDown,
    ArrowRight,
}

/// Every key, in chain-id order.
pub const ALL_KEYS: [KeyId; 78] = {
    use KeyId::*;
    [
        Escape, F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12, Grave, Digit1, Digit2,
        Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9, Digit0, Minus, Equal, Backspace,
        Tab, Q, W, E, R, T, Y, U, I, O, P, LeftBracket, RightBracket, Backslash, CapsLock, A, S,
        D, F, G, H, J, K, L, Semicolon, Quote, Enter, LeftShift, Z, X, C, V, B, N, M, Comma,
        Period, Slash, RightShift, LeftCtrl, LeftMeta, LeftAlt, Space, RightAlt, Fn, Menu,
        RightCtrl, ArrowUp, ArrowLeft, ArrowDown, ArrowRight,
    ]
};

/// One intersection of the 16x24 crosspoint IC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrosspointAddr {
    pub cs_index: u8,
    /// 5-bit row index, 0..16.
    pub row: u8,
    /// 5-bit column index, 0..24.
    pub col: u8,
}

impl KeyId {
    /// Flat per-key index in the Gtech architecture.
    pub const fn chain_id(self) -> u16 {
        self as u16
    }

    /// Crosspoint address on the legacy matrix board.
    ///
    /// The table mirrors the physical wiring: one matrix row per
    /// keyboard row, columns left to right, everything on chip 0.
    pub fn crosspoint(self) -> CrosspointAddr {
        use KeyId::*;
        let (row, col) = match self {
            Escape => (0, 0),
            F1 => (0, 2),
            F2 => (0, 3),
            F3 => (0, 4),
            F4 => (0, 5),
            F5 => (0, 7),
            F6 => (0, 8),
            F7 => (0, 9),
            F8 => (0, 10),
            F9 => (0, 12),
            F10 => (0, 13),
            F11 => (0, 14),
            F12 => (0, 15),
            Grave => (1, 0),
            Digit1 => (1, 1),
            Digit2 => (1, 2),
            Digit3 => (1, 3),
            Digit4 => (1, 4),
            Digit5 => (1, 5),
            Digit6 => (1, 6),
            Digit7 => (1, 7),
            Digit8 => (1, 8),
            Digit9 => (1, 9),
            Digit0 => (1, 10),
            Minus => (1, 11),
            Equal => (1, 12),
            Backspace => (1, 13),
            Tab => (2, 0),
            Q => (2, 1),
            W => (2, 2),
            E => (2, 3),
            R => (2, 4),
            T => (2, 5),
            Y => (2, 6),
            U => (2, 7),
            I => (2, 8),
            O => (2, 9),
            P => (2, 10),
            LeftBracket => (2, 11),
            RightBracket => (2, 12),
            Backslash => (2, 13),
            CapsLock => (3, 0),
            A => (3, 1),
            S => (3, 2),
            D => (3, 3),
            F => (3, 4),
            G => (3, 5),
            H => (3, 6),
            J => (3, 7),
            K => (3, 8),
            L => (3, 9),
            Semicolon => (3, 10),
            Quote => (3, 11),
            Enter => (3, 13),
            LeftShift => (4, 0),
            Z => (4, 2),
            X => (4, 3),
            C => (4, 4),
            V => (4, 5),
            B => (4, 6),
            N => (4, 7),
            M => (4, 8),
            Comma => (4, 9),
            Period => (4, 10),
            Slash => (4, 11),
            RightShift => (4, 13),
            LeftCtrl => (5, 0),
            LeftMeta => (5, 1),
            LeftAlt => (5, 2),
            Space => (5, 6),
            RightAlt => (5, 10),
            Fn => (5, 11),
            Menu => (5, 12),
            RightCtrl => (5, 13),
            ArrowUp => (6, 21),
            ArrowLeft => (7, 20),
            ArrowDown => (7, 21),
            ArrowRight => (7, 22),
        };
        CrosspointAddr {
            cs_index: 0,
            row,
            col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_are_dense_and_unique() {
        for (i, key) in ALL_KEYS.iter().enumerate() {
            assert_eq!(key.chain_id() as usize, i);
        }
    }

    #[test]
    fn crosspoints_fit_the_matrix() {
        for key in ALL_KEYS {
            let addr = key.crosspoint();
            assert!(addr.row < 16, "{key:?}");
            assert!(addr.col < 24, "{key:?}");
        }
    }

    #[test]
    fn crosspoints_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for key in ALL_KEYS {
            let addr = key.crosspoint();
            assert!(seen.insert((addr.cs_index, addr.row, addr.col)), "{key:?}");
        }
    }
}
