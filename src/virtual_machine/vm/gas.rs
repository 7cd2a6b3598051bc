use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;

/// Number of gas categories tracked by [`GasProfile`].
const GAS_CATEGORY_COUNT: usize = 7;

/// Buckets gas is booked under for profiling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// Halting, jumps, calls, assertions and labels.
    Control = 0,
    /// Pushes, pops, duplication and swaps.
    Stack = 1,
    Arithmetic = 2,
    Comparison = 3,
    /// `SLOAD` and `SSTORE`.
    Storage = 4,
    /// Reads from the execution context.
    Context = 5,
    /// Event emission.
    Event = 6,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::Control => "Control",
            GasCategory::Stack => "Stack",
            GasCategory::Arithmetic => "Arithmetic",
            GasCategory::Comparison => "Comparison",
            GasCategory::Storage => "Storage",
            GasCategory::Context => "Context",
            GasCategory::Event => "Event",
        }
    }

    /// All categories in discriminant order.
    const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::Control,
        GasCategory::Stack,
        GasCategory::Arithmetic,
        GasCategory::Comparison,
        GasCategory::Storage,
        GasCategory::Context,
        GasCategory::Event,
    ];
}

/// Gas consumption per [`GasCategory`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GasProfile {
    counts: [u64; GAS_CATEGORY_COUNT],
}

impl GasProfile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn add(&mut self, category: GasCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    pub fn get(&self, category: GasCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns the total gas across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all categories and their gas costs.
    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, u64)> {
        GasCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Cumulative gas counter bounded by the transaction's gas limit.
#[derive(Clone, Debug)]
pub struct GasMeter {
    used: u64,
    limit: u64,
    profile: GasProfile,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            used: 0,
            limit,
            profile: GasProfile::new(),
        }
    }

    /// Charges the cost of `instr` before it runs.
    ///
    /// Fails without charging if the cost would take usage past the limit.
    pub fn charge(&mut self, instr: Instruction, offset: usize) -> Result<(), VMError> {
        let cost = instr.base_gas();
        let total = self
            .used
            .checked_add(cost)
            .filter(|total| *total <= self.limit)
            .ok_or(VMError::OutOfGas {
                instruction: instr.mnemonic(),
                offset,
                used: self.used,
                cost,
                limit: self.limit,
            })?;
        self.used = total;
        self.profile.add(instr.category(), cost);
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn profile(&self) -> &GasProfile {
        &self.profile
    }

    pub(crate) fn into_profile(self) -> GasProfile {
        self.profile
    }
}
