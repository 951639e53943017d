//! Per-type behavior behind the engine's seven element types.
//!
//! The engine is polymorphic over element type via this trait and exhaustive
//! dispatch in [`crate::bench`]; each numeric type gets its own monomorphized
//! code path rather than runtime casts.

use std::cmp::Ordering;

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Normal, Uniform};

use crate::plugin::AlgoV2;
use crate::types::ElemType;

/// A sortable element type.
pub(crate) trait Element: Clone + Send + 'static {
    const ELEM_TYPE: ElemType;
    /// Strings take the word-generator path in [`crate::generate`].
    const STRINGY: bool = false;
    /// Total byte width for LSD radix, `None` when radix does not apply.
    const RADIX_BYTES: Option<usize> = None;
    /// Whether the v1 plugin ABI (i32-only) applies to this type.
    const PLUGIN_V1: bool = false;

    fn cmp_elems(a: &Self, b: &Self) -> Ordering;
    /// Value at position `i` of the sorted ramp.
    fn ramp(i: usize) -> Self;
    /// Embeds a small integer (duplicate keys, saw teeth, Zipf ranks).
    fn small(v: u64) -> Self;
    fn uniform(rng: &mut StdRng) -> Self;
    fn gauss(rng: &mut StdRng) -> Self;
    fn exponential(rng: &mut StdRng) -> Self;

    /// Order-preserving u64 embedding for LSD radix passes.
    fn radix_key(&self) -> u64 {
        0
    }

    /// Picks this type's entry point out of a v2 plugin descriptor.
    fn plugin_v2_entry(_algo: &AlgoV2) -> Option<unsafe extern "C" fn(*mut Self, i32)> {
        None
    }
}

macro_rules! impl_int_element {
    ($t:ty, $ut:ty, $et:expr, $signed:expr, $v2:ident) => {
        impl Element for $t {
            const ELEM_TYPE: ElemType = $et;
            const RADIX_BYTES: Option<usize> = Some(std::mem::size_of::<$t>());
            const PLUGIN_V1: bool = matches!($et, ElemType::I32);

            fn cmp_elems(a: &Self, b: &Self) -> Ordering {
                a.cmp(b)
            }

            fn ramp(i: usize) -> Self {
                i as $t
            }

            fn small(v: u64) -> Self {
                v as $t
            }

            fn uniform(rng: &mut StdRng) -> Self {
                rng.gen::<$t>()
            }

            fn gauss(rng: &mut StdRng) -> Self {
                let min = <$t>::MIN as f64;
                let max = <$t>::MAX as f64;
                let mean = if $signed { 0.0 } else { max / 2.0 };
                let stddev = (max - if $signed { min } else { 0.0 }) / 8.0;
                let normal = Normal::new(mean, stddev).expect("finite gauss params");
                normal.sample(rng).clamp(min, max) as $t
            }

            fn exponential(rng: &mut StdRng) -> Self {
                let max = <$t>::MAX as f64;
                let exp = Exp::new(1.0).expect("positive lambda");
                ((max / 8.0) * exp.sample(rng)).min(max) as $t
            }

            fn radix_key(&self) -> u64 {
                // Flip the sign bit of signed types so the unsigned byte
                // order matches the numeric order.
                let flip: $ut = if $signed { 1 << (<$ut>::BITS - 1) } else { 0 };
                ((*self as $ut) ^ flip) as u64
            }

            fn plugin_v2_entry(algo: &AlgoV2) -> Option<unsafe extern "C" fn(*mut Self, i32)> {
                algo.$v2
            }
        }
    };
}

impl_int_element!(i32, u32, ElemType::I32, true, run_i32);
impl_int_element!(u32, u32, ElemType::U32, false, run_u32);
impl_int_element!(i64, u64, ElemType::I64, true, run_i64);
impl_int_element!(u64, u64, ElemType::U64, false, run_u64);

macro_rules! impl_float_element {
    ($t:ty, $et:expr, $v2:ident) => {
        impl Element for $t {
            const ELEM_TYPE: ElemType = $et;

            fn cmp_elems(a: &Self, b: &Self) -> Ordering {
                a.total_cmp(b)
            }

            fn ramp(i: usize) -> Self {
                i as $t
            }

            fn small(v: u64) -> Self {
                v as $t
            }

            fn uniform(rng: &mut StdRng) -> Self {
                rng.gen::<$t>()
            }

            fn gauss(rng: &mut StdRng) -> Self {
                let normal = Normal::new(0.0, 1.0).expect("finite gauss params");
                normal.sample(rng) as $t
            }

            fn exponential(rng: &mut StdRng) -> Self {
                let exp = Exp::new(1.0).expect("positive lambda");
                exp.sample(rng) as $t
            }

            fn plugin_v2_entry(algo: &AlgoV2) -> Option<unsafe extern "C" fn(*mut Self, i32)> {
                algo.$v2
            }
        }
    };
}

impl_float_element!(f32, ElemType::F32, run_f32);
impl_float_element!(f64, ElemType::F64, run_f64);

impl Element for String {
    const ELEM_TYPE: ElemType = ElemType::Str;
    const STRINGY: bool = true;

    fn cmp_elems(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn ramp(i: usize) -> Self {
        // Zero-padded so lexicographic order matches numeric order.
        format!("{i:020}")
    }

    fn small(v: u64) -> Self {
        format!("{v:020}")
    }

    fn uniform(rng: &mut StdRng) -> Self {
        let len = Uniform::new_inclusive(1usize, 16).sample(rng);
        let letters = Uniform::new_inclusive(b'a', b'z');
        (0..len).map(|_| letters.sample(rng) as char).collect()
    }

    fn gauss(rng: &mut StdRng) -> Self {
        Self::uniform(rng)
    }

    fn exponential(rng: &mut StdRng) -> Self {
        Self::uniform(rng)
    }
}
