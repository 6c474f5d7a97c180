use std::collections::BTreeMap;

/// The address→line mapping from `.debug_line`. One source line may map to
/// several addresses; every address maps to at most one line. The canonical
/// address for a line is the smallest one in its pre-image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    addr_to_line: BTreeMap<u64, u64>,
}

impl LineMap {
    pub fn new(pairs: impl IntoIterator<Item = (u64, u64)>) -> LineMap {
        LineMap {
            addr_to_line: pairs.into_iter().collect(),
        }
    }

    pub fn line_for_addr(&self, address: u64) -> Option<u64> {
        self.addr_to_line.get(&address).copied()
    }

    pub fn addr_for_line(&self, line: u64) -> Option<u64> {
        self.addr_to_line
            .iter()
            .find(|(_, l)| **l == line)
            .map(|(a, _)| *a)
    }
}
