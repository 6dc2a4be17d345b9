//! Kitsune Future Tuning Params
#![allow(missing_docs)]

pub use tuning_params_struct::KitsuneFutureTuningParams;

/// Shared handle to the tuning params, cloned into every future.
pub type KitsuneFutureTuning = std::sync::Arc<KitsuneFutureTuningParams>;

/// Wrapper for the actual KitsuneFutureTuningParams struct
/// so the serialization impls can be generated in one place.
pub mod tuning_params_struct {
    use crate::PayloadMode;
    use std::collections::HashMap;

    macro_rules! mk_tune {
        ($($(#[doc = $doc:expr])* $i:ident: $t:ty = $d:expr,)*) => {
            /// Future tuning parameters.
            /// This is serialized so all the values are represented as strings,
            /// which lets us proceed with a printed warning for params that
            /// are removed, but still specified in configs.
            #[non_exhaustive]
            #[derive(Clone, Debug, PartialEq)]
            pub struct KitsuneFutureTuningParams {
                $(
                    $(#[doc = $doc])*
                    pub $i: $t,
                )*
            }

            impl Default for KitsuneFutureTuningParams {
                fn default() -> Self {
                    Self {
                        $(
                            $i: $d,
                        )*
                    }
                }
            }

            impl serde::Serialize for KitsuneFutureTuningParams {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    use serde::ser::SerializeMap;
                    let mut m = serializer.serialize_map(None)?;
                    $(
                        m.serialize_entry(
                            stringify!($i),
                            &format!("{}", &self.$i),
                        )?;
                    )*
                    m.end()
                }
            }

            impl<'de> serde::Deserialize<'de> for KitsuneFutureTuningParams {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let result = <HashMap<String, String>>::deserialize(deserializer)?;
                    let mut out = KitsuneFutureTuningParams::default();
                    for (k, v) in result.into_iter() {
                        match k.as_str() {
                            $(
                                stringify!($i) => match v.parse::<$t>() {
                                    Ok(v) => out.$i = v,
                                    Err(e) => tracing::warn!("failed to parse {}: {}", k, e),
                                },
                            )*
                            _ => tracing::warn!("INVALID TUNING PARAM: '{}'", k),
                        }
                    }
                    Ok(out)
                }
            }
        };
    }

    mk_tune! {
        /// Timeout used by `await_completion_default`, 0 waits forever.
        /// [Default: 0]
        default_await_timeout_ms: u64 = 0,

        /// A listener running longer than this is reported at warn level.
        /// [Default: 100]
        slow_listener_warn_ms: u64 = 100,

        /// How payload futures built without an explicit mode convert
        /// their payload on completion. [Default: "raw"]
        default_payload_mode: PayloadMode = PayloadMode::Raw,
    }

    impl KitsuneFutureTuningParams {
        /// The await timeout as a duration, `None` meaning no timeout.
        pub fn default_await_timeout(&self) -> Option<std::time::Duration> {
            match self.default_await_timeout_ms {
                0 => None,
                ms => Some(std::time::Duration::from_millis(ms)),
            }
        }

        pub fn slow_listener_warn(&self) -> std::time::Duration {
            std::time::Duration::from_millis(self.slow_listener_warn_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PayloadMode;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn tuning_params_roundtrip_through_string_map() {
        let mut params = KitsuneFutureTuningParams::default();
        params.slow_listener_warn_ms = 5;
        params.default_payload_mode = PayloadMode::Decoded;

        let map: HashMap<String, String> =
            rmp_serde::from_slice(&rmp_serde::to_vec(&params).unwrap()).unwrap();
        assert_eq!("5", map["slow_listener_warn_ms"]);
        assert_eq!("decoded", map["default_payload_mode"]);

        let back: KitsuneFutureTuningParams =
            rmp_serde::from_slice(&rmp_serde::to_vec(&map).unwrap()).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn unknown_and_bad_params_are_ignored() {
        let mut map = HashMap::new();
        map.insert("no_such_param".to_string(), "1".to_string());
        map.insert("default_await_timeout_ms".to_string(), "lots".to_string());
        map.insert("slow_listener_warn_ms".to_string(), "7".to_string());

        let params: KitsuneFutureTuningParams =
            rmp_serde::from_slice(&rmp_serde::to_vec(&map).unwrap()).unwrap();
        assert_eq!(None, params.default_await_timeout());
        assert_eq!(std::time::Duration::from_millis(7), params.slow_listener_warn());
    }
}
