use std::{fmt, str::FromStr};

/// Named integer registers of the Tau machine. The general-purpose bank is
/// sized per VM instance, so `Gp` carries the index and bounds are checked
/// against the live machine, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegName {
    Ip,
    Bp,
    Sp,
    Flags,
    Gp(usize),
}

impl fmt::Display for RegName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegName::Ip => write!(f, "IP"),
            RegName::Bp => write!(f, "BP"),
            RegName::Sp => write!(f, "SP"),
            RegName::Flags => write!(f, "FLAGS"),
            RegName::Gp(k) => write!(f, "R{}", k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRegisterError(pub String);

impl fmt::Display for ParseRegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a register name", self.0)
    }
}

impl FromStr for RegName {
    type Err = ParseRegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reg = match s {
            "IP" => RegName::Ip,
            "BP" => RegName::Bp,
            "SP" => RegName::Sp,
            "FLAGS" => RegName::Flags,
            _ => {
                let idx = indexed(s, 'R').ok_or_else(|| ParseRegisterError(s.to_string()))?;
                RegName::Gp(idx)
            }
        };
        Ok(reg)
    }
}

impl RegName {
    /// Whether the name exists on a machine with `gp_count` general-purpose
    /// registers.
    pub fn is_valid(&self, gp_count: usize) -> bool {
        match self {
            RegName::Gp(k) => *k < gp_count,
            _ => true,
        }
    }
}

/// Parses `F3` style float-register names into their index.
pub fn float_reg_index(s: &str) -> Option<usize> {
    indexed(s, 'F')
}

/// Parses `D2` style debug-register names into their index.
pub fn debug_reg_index(s: &str) -> Option<usize> {
    indexed(s, 'D')
}

fn indexed(s: &str, prefix: char) -> Option<usize> {
    let rest = s.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}
