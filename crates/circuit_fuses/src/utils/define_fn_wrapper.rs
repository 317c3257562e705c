// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Generates a clonable, thread-safe wrapper around a user supplied closure.
///
/// Predicates and listeners handed to breakers are stored as `Arc<dyn Fn ...>` so that breakers,
/// handles and retry controllers can share them without requiring the closure itself to be `Clone`.
///
/// ```rust,ignore
/// define_fn_wrapper!(ErrorFn<E>(Fn(error: &E) -> bool));
/// define_fn_wrapper!(OnTrip(Fn(event: &TripEvent) -> ()));
/// ```
///
/// The generated type exposes `new`, `call`, and implements `Clone` and `Debug`.
macro_rules! define_fn_wrapper {
    ($name:ident $(<$($generics:ident),*>)? (Fn($($param_name:ident: $param_ty:ty),*) -> $return_ty:ty)) => {
        pub(crate) struct $name $(<$($generics),*>)? (std::sync::Arc<dyn Fn($($param_ty),*) -> $return_ty + Send + Sync>);

        impl $(<$($generics),*>)? $name $(<$($generics),*>)? {
            pub(crate) fn new<F>(f: F) -> Self
            where
                F: Fn($($param_ty),*) -> $return_ty + Send + Sync + 'static,
            {
                Self(std::sync::Arc::new(f))
            }

            pub(crate) fn call(&self, $($param_name: $param_ty),*) -> $return_ty {
                (self.0)($($param_name),*)
            }
        }

        impl $(<$($generics),*>)? Clone for $name $(<$($generics),*>)? {
            fn clone(&self) -> Self {
                Self(std::sync::Arc::clone(&self.0))
            }
        }

        impl $(<$($generics),*>)? std::fmt::Debug for $name $(<$($generics),*>)? {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }
    };
}

pub(crate) use define_fn_wrapper;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    define_fn_wrapper!(IsEven<T>(Fn(value: T) -> bool));
    define_fn_wrapper!(Describe(Fn(value: u32) -> String));

    #[test]
    fn generic_wrapper_calls_closure() {
        let is_even = IsEven::new(|value: u32| value % 2 == 0);
        let cloned = is_even.clone();

        assert!(is_even.call(4));
        assert!(!cloned.call(3));
        assert_eq!(format!("{is_even:?}"), "IsEven");
    }

    #[test]
    fn plain_wrapper_calls_closure() {
        let describe = Describe::new(|value| format!("value {value}"));

        assert_eq!(describe.call(7), "value 7");
        assert_eq!(format!("{describe:?}"), "Describe");
    }
}
