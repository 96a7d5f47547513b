//! Typed Node Inputs
//!
//! A computed node's inputs are a tuple type `In`. Each tuple element is one
//! input slot, bound positionally to a cell of exactly that element's type.
//! Slot types are checked at compile time through [`InputAt`].
//!
//! Tuples of zero to eight elements are supported. Every element type must
//! implement `Default`: an unbound or destroyed input reads as its default.

use super::runtime::{CellId, GraphState};

/// A tuple of input types that a computed node reads.
pub trait Inputs: Sized + 'static {
    /// Number of input slots.
    const ARITY: usize;

    /// Clone every input's current value out of the graph, substituting the
    /// default for unbound or destroyed slots.
    fn pull(state: &GraphState, slots: &[Option<CellId>]) -> Self;
}

/// Type of the input slot at index `I`.
pub trait InputAt<const I: usize>: Inputs {
    type Value: Clone + PartialEq + Default + 'static;
}

/// A pure function over an input tuple.
///
/// Implemented for every `Fn(&A, &B, ..) -> T` whose arguments match the tuple.
pub trait Compute<In, T>: 'static {
    fn compute(&self, inputs: &In) -> T;
}

macro_rules! impl_inputs {
    (@slots $all:tt $($T:ident $idx:tt),*) => {
        $( impl_input_at!($all $T $idx); )*
    };
    ($arity:expr; $($T:ident $arg:ident $idx:tt),*) => {
        impl<$($T: Clone + PartialEq + Default + 'static),*> Inputs for ($($T,)*) {
            const ARITY: usize = $arity;

            #[allow(unused_variables)]
            fn pull(state: &GraphState, slots: &[Option<CellId>]) -> Self {
                ($(state.read_or_default::<$T>(slots.get($idx).copied().flatten()),)*)
            }
        }

        impl<Func, Out, $($T),*> Compute<($($T,)*), Out> for Func
        where
            Func: Fn($(&$T),*) -> Out + 'static,
        {
            fn compute(&self, inputs: &($($T,)*)) -> Out {
                let ($($arg,)*) = inputs;
                self($($arg),*)
            }
        }

        impl_inputs!(@slots [$($T)*] $($T $idx),*);
    };
}

macro_rules! impl_input_at {
    ([$($G:ident)*] $T:ident $idx:tt) => {
        impl<$($G: Clone + PartialEq + Default + 'static),*> InputAt<$idx> for ($($G,)*) {
            type Value = $T;
        }
    };
}

impl_inputs!(0;);
impl_inputs!(1; A a 0);
impl_inputs!(2; A a 0, B b 1);
impl_inputs!(3; A a 0, B b 1, C c 2);
impl_inputs!(4; A a 0, B b 1, C c 2, D d 3);
impl_inputs!(5; A a 0, B b 1, C c 2, D d 3, E e 4);
impl_inputs!(6; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5);
impl_inputs!(7; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6);
impl_inputs!(8; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6, H h 7);
