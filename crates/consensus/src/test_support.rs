//! Unit fixtures shared by the builder and oracle tests

use dagchain_domain::{Address, Unit, COUNT_WITNESSES};

pub(crate) struct DagFixture {
    pub witnesses: Vec<Address>,
    clock: u64,
}

impl DagFixture {
    pub fn new() -> Self {
        Self {
            witnesses: (0..COUNT_WITNESSES)
                .map(|i| Address::from_definition(format!("witness-{}", i).as_bytes()))
                .collect(),
            clock: 1_700_000_000_000,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Genesis authored by witness 0, declaring the full list
    pub fn genesis(&mut self) -> Unit {
        let ts = self.tick();
        Unit::new(vec![], vec![self.witnesses[0].clone()], Some(self.witnesses.clone()), ts)
            .seal()
            .unwrap()
    }

    pub fn genesis_with_payload(&mut self, payload: &str) -> Unit {
        let ts = self.tick();
        Unit::new(vec![], vec![self.witnesses[0].clone()], Some(self.witnesses.clone()), ts)
            .with_payload(payload)
            .seal()
            .unwrap()
    }

    /// Unit authored by witness `author`, inheriting its witness list
    pub fn child(&mut self, parents: &[&Unit], author: usize) -> Unit {
        let author = self.witnesses[author].clone();
        self.child_by(parents, author)
    }

    pub fn child_by(&mut self, parents: &[&Unit], author: Address) -> Unit {
        let ts = self.tick();
        Unit::new(
            parents.iter().map(|p| p.unit.clone()).collect(),
            vec![author],
            None,
            ts,
        )
        .seal()
        .unwrap()
    }

    pub fn child_with_witnesses(
        &mut self,
        parents: &[&Unit],
        author: usize,
        witnesses: Vec<Address>,
    ) -> Unit {
        let ts = self.tick();
        Unit::new(
            parents.iter().map(|p| p.unit.clone()).collect(),
            vec![self.witnesses[author].clone()],
            Some(witnesses),
            ts,
        )
        .seal()
        .unwrap()
    }

    /// Genesis plus `len - 1` descendants; unit `k` is authored by witness `k % 12`
    pub fn linear_chain(&mut self, len: usize) -> Vec<Unit> {
        let mut units = vec![self.genesis()];
        for k in 1..len {
            let unit = self.child(&[&units[k - 1]], k % COUNT_WITNESSES);
            units.push(unit);
        }
        units
    }

    /// Extend an existing chain by `count` units, continuing the author rotation
    pub fn extend_chain(&mut self, units: &mut Vec<Unit>, count: usize) {
        for _ in 0..count {
            let k = units.len();
            let unit = self.child(&[&units[k - 1]], k % COUNT_WITNESSES);
            units.push(unit);
        }
    }
}
