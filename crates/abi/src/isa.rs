use serde::{Deserialize, Serialize};

/// The 30 primitives. A code cell holding one of these numbers runs it;
/// anything else in a code cell is a decode fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Opcode {
    // --- Core Execution ---
    Halt = 0,          // Stop the run loop
    Key = 1,           // ( -- c ) read one byte
    Emit = 2,          // ( c -- ) write one byte
    Lit = 3,           // ( -- n ) push the inline thread cell
    Exit = 4,          // RS: ( a -- ) return to caller's thread
    Execute = 5,       // ( cfa -- ) tail-jump, no NEXT

    // --- Control Flow ---
    Loop = 6,          // RS top is the counter
    BranchIfZero = 7,  // ( flag -- )
    Branch = 8,

    // --- Memory ---
    Store = 9,         // ( value addr -- )
    Fetch = 10,        // ( addr -- v )
    CStore = 11,       // ( value addr -- ) low byte only
    CFetch = 12,       // ( addr -- c )

    // --- Stack Registers ---
    RpFetch = 13,
    RpStore = 14,
    RFrom = 15,
    RFetch = 16,
    ToR = 17,
    SpFetch = 18,
    SpStore = 19,

    // --- Stack Manipulation ---
    Drop = 20,
    Dup = 21,
    Swap = 22,
    Over = 23,

    // --- Arithmetic / Logic ---
    ZeroLess = 24,     // ( n -- flag ) all ones if sign bit set
    And = 25,
    Or = 26,
    Xor = 27,
    UmPlus = 28,       // ( a b -- lo carry )

    // --- Threading ---
    DoList = 29,       // enter a colon definition
}

impl Opcode {
    pub const COUNT: u16 = 30;

    const ALL: [Opcode; Opcode::COUNT as usize] = [
        Opcode::Halt,
        Opcode::Key,
        Opcode::Emit,
        Opcode::Lit,
        Opcode::Exit,
        Opcode::Execute,
        Opcode::Loop,
        Opcode::BranchIfZero,
        Opcode::Branch,
        Opcode::Store,
        Opcode::Fetch,
        Opcode::CStore,
        Opcode::CFetch,
        Opcode::RpFetch,
        Opcode::RpStore,
        Opcode::RFrom,
        Opcode::RFetch,
        Opcode::ToR,
        Opcode::SpFetch,
        Opcode::SpStore,
        Opcode::Drop,
        Opcode::Dup,
        Opcode::Swap,
        Opcode::Over,
        Opcode::ZeroLess,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::UmPlus,
        Opcode::DoList,
    ];

    pub fn decode(raw: u16) -> Option<Opcode> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn all() -> impl Iterator<Item = Opcode> {
        Self::ALL.into_iter()
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Classic eForth word name, as it appears in a dictionary listing.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "BYE",
            Opcode::Key => "KEY",
            Opcode::Emit => "TX!",
            Opcode::Lit => "doLIT",
            Opcode::Exit => "EXIT",
            Opcode::Execute => "EXECUTE",
            Opcode::Loop => "next",
            Opcode::BranchIfZero => "?branch",
            Opcode::Branch => "branch",
            Opcode::Store => "!",
            Opcode::Fetch => "@",
            Opcode::CStore => "C!",
            Opcode::CFetch => "C@",
            Opcode::RpFetch => "RP@",
            Opcode::RpStore => "RP!",
            Opcode::RFrom => "R>",
            Opcode::RFetch => "R@",
            Opcode::ToR => ">R",
            Opcode::SpFetch => "SP@",
            Opcode::SpStore => "SP!",
            Opcode::Drop => "DROP",
            Opcode::Dup => "DUP",
            Opcode::Swap => "SWAP",
            Opcode::Over => "OVER",
            Opcode::ZeroLess => "0<",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::UmPlus => "UM+",
            Opcode::DoList => "doLIST",
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Opcode::decode(raw).ok_or(raw)
    }
}
