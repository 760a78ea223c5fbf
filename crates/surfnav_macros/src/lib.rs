use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, FnArg, Pat};

/// Time a navigation stage system when the `perf_stats` feature is enabled.
///
/// The function body is wrapped with a drop guard that logs the elapsed time
/// through Bevy's `info!` when the stage exceeds the threshold. Without the
/// `perf_stats` feature the guard is compiled out entirely.
///
/// If the system takes a `clock: Res<NavClock>` parameter the guard also
/// logs every 100th tick regardless of duration.
///
/// # Example
/// ```ignore
/// #[profile]
/// pub fn track_surfaces(
///     agents: Query<&NavAgent>,
///     clock: Res<NavClock>,  // picked up automatically
/// ) {
///     // ...
/// }
/// ```
///
/// A custom threshold in milliseconds can be passed: `#[profile(4)]`.
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    // Look for `clock: Res<NavClock>` so the guard can log on tick boundaries.
    let has_clock_param = sig.inputs.iter().any(|arg| {
        if let FnArg::Typed(pat_type) = arg {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if pat_ident.ident == "clock" {
                    let ty = &pat_type.ty;
                    let type_str = quote!(#ty).to_string();
                    return type_str.contains("NavClock");
                }
            }
        }
        false
    });

    let profile_guard_def = if has_clock_param {
        quote! {
            struct StageGuard {
                name: &'static str,
                start: std::time::Instant,
                tick: u64,
            }
            impl Drop for StageGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() > #threshold_ms || self.tick % 100 == 0 {
                        bevy::prelude::info!("[PERF] {} tick={}: {:?}", self.name, self.tick, elapsed);
                    }
                }
            }
            StageGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
                tick: clock.tick,
            }
        }
    } else {
        quote! {
            struct StageGuard {
                name: &'static str,
                start: std::time::Instant,
            }
            impl Drop for StageGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() > #threshold_ms {
                        bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                }
            }
            StageGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _stage_guard = {
                #profile_guard_def
            };

            #block
        }
    };

    output.into()
}
