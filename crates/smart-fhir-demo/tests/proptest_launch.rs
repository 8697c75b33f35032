//! Property-based tests for launch settings and session state.

use std::collections::HashMap;

use proptest::prelude::*;
use url::Url;

use smart_fhir_demo::FhirClient;
use smart_fhir_demo::config::{Config, SmartSettings};
use smart_fhir_demo::models::OAuthEndpoints;
use smart_fhir_demo::smart::{ClientState, SmartClient};

/// Issuer URLs with and without a trailing slash.
fn arb_issuer() -> impl Strategy<Value = (String, bool)> {
    ("[a-z]{1,12}", proptest::collection::vec("[a-z0-9]{1,8}", 0..4), any::<bool>()).prop_map(
        |(host, segments, slash)| {
            let mut iss = format!("https://{host}.example.org");
            for segment in segments {
                iss.push('/');
                iss.push_str(&segment);
            }
            if slash {
                iss.push('/');
            }
            (iss, slash)
        },
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    /// The launch base always ends in exactly one slash.
    #[test]
    fn launch_base_has_one_trailing_slash((iss, _) in arb_issuer()) {
        let settings = SmartSettings::default().for_launch(&iss, None);
        prop_assert!(settings.api_base.ends_with('/'));
        prop_assert!(!settings.api_base.ends_with("//"));
        prop_assert_eq!(settings.api_base.trim_end_matches('/'), iss.trim_end_matches('/'));
    }

    /// The authorize URL's `aud` is the normalized launch base.
    #[test]
    fn authorize_aud_matches_launch_base((iss, _) in arb_issuer(), launch in "[A-Za-z0-9]{1,16}") {
        let settings = SmartSettings::default().for_launch(&iss, Some(launch.clone()));
        let expected = settings.api_base.clone();

        let mut state = ClientState::new(settings);
        state.endpoints = Some(OAuthEndpoints {
            authorize: Some("https://auth.example.org/authorize".into()),
            token: Some("https://auth.example.org/token".into()),
            register: None,
        });

        let fhir = FhirClient::new(&Config::default()).unwrap();
        let mut client = SmartClient::resume(state, fhir, None).unwrap();
        let url = runtime().block_on(client.authorize_url()).unwrap().unwrap();

        let params: HashMap<String, String> =
            Url::parse(&url).unwrap().query_pairs().into_owned().collect();
        prop_assert_eq!(&params["aud"], &expected);
        prop_assert_eq!(&params["launch"], &launch);
    }

    /// Saved state restores readiness and patient context.
    #[test]
    fn state_bytes_roundtrip((iss, _) in arb_issuer(), patient in proptest::option::of("[a-z0-9-]{1,20}")) {
        let mut state = ClientState::new(SmartSettings::default().for_launch(&iss, None));
        state.patient_id = patient.clone();

        let restored = ClientState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(&restored, &state);

        let fhir = FhirClient::new(&Config::default()).unwrap();
        let client = SmartClient::resume(restored, fhir, None).unwrap();
        prop_assert!(!client.ready());
        prop_assert_eq!(client.patient_id(), patient.as_deref());
    }
}
