use std::fmt;
use std::ops::{Index, IndexMut};

/// One of the two independently versioned repositories. `A` is the primary
/// side whose history drives the search, `B` the secondary side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "side A"),
            Side::B => write!(f, "side B"),
        }
    }
}

/// A value per side, indexed by [`Side`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidePair<T> {
    pub a: T,
    pub b: T,
}

impl<T> SidePair<T> {
    pub fn new(a: T, b: T) -> Self {
        SidePair { a, b }
    }
}

impl<T> Index<Side> for SidePair<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

impl<T> IndexMut<Side> for SidePair<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_pair_indexing() {
        let mut pair = SidePair::new(1, 2);
        pair[Side::B] += 10;
        assert_eq!(pair[Side::A], 1);
        assert_eq!(pair[Side::B], 12);
    }
}
