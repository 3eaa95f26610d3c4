//! Instruction categories and per-site category flags.

use std::fmt;
use std::ops::BitOr;

/// Opaque calling-context id issued by the context service.
///
/// Handles are dense in `[0, max_handle)`; handle 0 is reserved for "no context".
pub type ContextHandle = u32;

/// Instruction category tracked per calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    MemoryLoad,
    MemoryStore,
    ConditionalBranch,
    UnconditionalBranch,
}

impl Category {
    /// Number of categories.
    pub const COUNT: usize = 4;

    /// All categories, in report order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::MemoryLoad,
        Self::MemoryStore,
        Self::ConditionalBranch,
        Self::UnconditionalBranch,
    ];

    /// Dense index, matching the position in [`Category::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::MemoryLoad => 0,
            Self::MemoryStore => 1,
            Self::ConditionalBranch => 2,
            Self::UnconditionalBranch => 3,
        }
    }

    /// Section label used in the text report.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MemoryLoad => "MEMORY LOAD",
            Self::MemoryStore => "MEMORY STORE",
            Self::ConditionalBranch => "CONDITIONAL BRANCHES",
            Self::UnconditionalBranch => "UNCONDITIONAL_BRANCHES",
        }
    }

    /// Short snake-case name, used for metric labels and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MemoryLoad => "memory_load",
            Self::MemoryStore => "memory_store",
            Self::ConditionalBranch => "conditional_branch",
            Self::UnconditionalBranch => "unconditional_branch",
        }
    }

    /// The single-category flag set.
    #[must_use]
    pub const fn flag(self) -> CategoryFlags {
        CategoryFlags(1 << self.index())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of categories a static instruction belongs to.
///
/// Categories overlap: an instruction that both reads and writes memory
/// carries `LOAD | STORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CategoryFlags(u8);

impl CategoryFlags {
    pub const NONE: Self = Self(0);
    pub const LOAD: Self = Category::MemoryLoad.flag();
    pub const STORE: Self = Category::MemoryStore.flag();
    pub const COND_BRANCH: Self = Category::ConditionalBranch.flag();
    pub const UNCOND_BRANCH: Self = Category::UnconditionalBranch.flag();

    const MASK: u8 = (1 << Category::COUNT) - 1;

    /// Build from the four classification answers, in the argument order the
    /// instrumentation layer passes them.
    #[must_use]
    #[allow(clippy::fn_params_excessive_bools, clippy::similar_names)]
    pub const fn from_bools(is_ubr: bool, is_cbr: bool, is_store: bool, is_load: bool) -> Self {
        let mut bits = 0;
        if is_ubr {
            bits |= Self::UNCOND_BRANCH.0;
        }
        if is_cbr {
            bits |= Self::COND_BRANCH.0;
        }
        if is_store {
            bits |= Self::STORE.0;
        }
        if is_load {
            bits |= Self::LOAD.0;
        }
        Self(bits)
    }

    /// Build from raw bits, dropping unknown ones.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, category: Category) -> bool {
        self.0 & category.flag().0 != 0
    }

    /// Categories in this set, in report order.
    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl BitOr for CategoryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<Category> for CategoryFlags {
    fn from(category: Category) -> Self {
        category.flag()
    }
}
