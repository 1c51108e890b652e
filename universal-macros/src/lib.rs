
use proc_macro::TokenStream;

/// Runs an `async fn(rng: rand_chacha::ChaCha8Rng)` as a test on a multi-threaded runtime, with fake time and a
/// tracing subscriber installed.
///
/// The test runs once per seed. `UNIVERSAL_TEST_RNG_SEED` pins a single seed and `UNIVERSAL_TEST_SAMPLES` sets how
/// many seeds to try. The seed of a failing run is printed.
#[proc_macro_attribute]
pub fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    test::test_macro(args.into(), item.into()).into()
}
