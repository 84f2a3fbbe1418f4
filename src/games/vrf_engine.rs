use crate::games::types::{GameType, RoundId, VRFBundle};
use chrono::{DateTime, Utc};
use schnorrkel::vrf::{VRFInOut, VRFPreOut, VRFProof};
use schnorrkel::{signing_context, Keypair, PublicKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"roundhouse";
const SEED_CONTEXT: &[u8] = b"roundhouse-seed";

/// VRF-based round seed generator
pub struct VRFGameEngine {
    keypair: Arc<Keypair>,
}

impl VRFGameEngine {
    /// Create a new VRF engine with a keypair
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Create a new VRF engine with a random keypair
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        let keypair = Keypair::generate_with(OsRng);
        Self::new(keypair)
    }

    /// Create an engine from a 32-byte secret seed. The same seed gives the
    /// same key, and the same key gives the same seed for a given input.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, String> {
        use schnorrkel::{ExpansionMode, MiniSecretKey};
        let mini = MiniSecretKey::from_bytes(seed).map_err(|e| format!("Invalid VRF seed: {:?}", e))?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519)))
    }

    /// Input message evaluated for a round. The opening time keeps inputs
    /// unique when a restarted table numbers its rounds from 1 again.
    pub fn round_input(round_id: &RoundId, game_type: GameType, opened_at: DateTime<Utc>) -> String {
        format!(
            "{}:{}:{}:{}",
            round_id.table,
            round_id.number,
            game_type,
            opened_at.timestamp_millis()
        )
    }

    /// Derive the seed for a round together with the proof that binds it
    /// to this engine's public key
    pub fn round_seed(
        &self,
        round_id: &RoundId,
        game_type: GameType,
        opened_at: DateTime<Utc>,
    ) -> Result<([u8; 32], VRFBundle), String> {
        let input_message = Self::round_input(round_id, game_type, opened_at);
        let transcript = signing_context(VRF_SIGNING_CONTEXT).bytes(input_message.as_bytes());
        let (inout, proof, _) = self.keypair.vrf_sign(transcript);

        let bundle = VRFBundle {
            vrf_output: hex::encode(inout.to_preout().to_bytes()),
            vrf_proof: hex::encode(proof.to_bytes()),
            public_key: self.public_key_hex(),
            input_message,
        };

        Ok((seed_of(&inout), bundle))
    }

    /// Commitment published when betting closes, before the seed is revealed
    pub fn seed_commitment(seed: &[u8; 32]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hex::encode(hasher.finalize())
    }

    /// Recompute the seed carried by a bundle. Does not check the proof;
    /// see [`VRFGameEngine::verify_vrf_proof`].
    pub fn seed_from_bundle(vrf_bundle: &VRFBundle) -> Result<[u8; 32], String> {
        let public_key = decode_public_key(&vrf_bundle.public_key)?;
        let preout = decode_preout(&vrf_bundle.vrf_output)?;
        let transcript = signing_context(VRF_SIGNING_CONTEXT).bytes(vrf_bundle.input_message.as_bytes());
        let inout = preout
            .attach_input_hash(&public_key, transcript)
            .map_err(|e| format!("Invalid VRF output: {:?}", e))?;
        Ok(seed_of(&inout))
    }

    /// Verify a VRF proof (public verification function)
    pub fn verify_vrf_proof(vrf_bundle: &VRFBundle, expected_input: &str) -> Result<bool, String> {
        if vrf_bundle.input_message != expected_input {
            return Ok(false);
        }

        let public_key = decode_public_key(&vrf_bundle.public_key)?;
        let preout = decode_preout(&vrf_bundle.vrf_output)?;
        let proof_bytes = hex::decode(&vrf_bundle.vrf_proof).map_err(|e| format!("Invalid VRF proof hex: {}", e))?;
        let proof = VRFProof::from_bytes(&proof_bytes).map_err(|e| format!("Invalid VRF proof: {:?}", e))?;

        let transcript = signing_context(VRF_SIGNING_CONTEXT).bytes(expected_input.as_bytes());
        Ok(public_key.vrf_verify(transcript, &preout, &proof).is_ok())
    }

    /// Get the public key for this VRF engine
    pub fn public_key(&self) -> Vec<u8> {
        self.keypair.public.to_bytes().to_vec()
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}

fn seed_of(inout: &VRFInOut) -> [u8; 32] {
    inout.make_bytes::<[u8; 32]>(SEED_CONTEXT)
}

fn decode_public_key(public_key_hex: &str) -> Result<PublicKey, String> {
    let bytes = hex::decode(public_key_hex).map_err(|e| format!("Invalid public key hex: {}", e))?;
    PublicKey::from_bytes(&bytes).map_err(|e| format!("Invalid public key: {:?}", e))
}

fn decode_preout(output_hex: &str) -> Result<VRFPreOut, String> {
    let bytes = hex::decode(output_hex).map_err(|e| format!("Invalid VRF output hex: {}", e))?;
    VRFPreOut::from_bytes(&bytes).map_err(|e| format!("Invalid VRF output: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::TableId;
    use chrono::TimeZone;

    fn opened() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_round_seed_generation_and_verification() {
        let engine = VRFGameEngine::new_random();
        let round_id = RoundId::new(TableId::from("wingo-1m"), 42);

        let (seed, bundle) = engine
            .round_seed(&round_id, GameType::WinGo, opened())
            .expect("VRF generation failed");

        let expected_input = VRFGameEngine::round_input(&round_id, GameType::WinGo, opened());
        let is_valid = VRFGameEngine::verify_vrf_proof(&bundle, &expected_input).expect("Verification failed");
        assert!(is_valid, "VRF proof should be valid");
        assert_eq!(VRFGameEngine::seed_from_bundle(&bundle).unwrap(), seed);
    }

    #[test]
    fn test_seed_is_deterministic_per_key() {
        let engine = VRFGameEngine::from_seed(&[3u8; 32]).unwrap();
        let round_id = RoundId::new(TableId::from("aviator-1"), 1);

        let (a, first) = engine.round_seed(&round_id, GameType::Aviator, opened()).unwrap();
        let (b, second) = engine.round_seed(&round_id, GameType::Aviator, opened()).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.vrf_output, second.vrf_output);

        // Same key after a restart
        let restarted = VRFGameEngine::from_seed(&[3u8; 32]).unwrap();
        let (again, _) = restarted.round_seed(&round_id, GameType::Aviator, opened()).unwrap();
        assert_eq!(a, again);

        let next = RoundId::new(TableId::from("aviator-1"), 2);
        let (c, _) = engine.round_seed(&next, GameType::Aviator, opened()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_reopened_round_number_gets_fresh_seed() {
        let engine = VRFGameEngine::from_seed(&[3u8; 32]).unwrap();
        let round_id = RoundId::new(TableId::from("aviator-1"), 1);

        let (before, _) = engine.round_seed(&round_id, GameType::Aviator, opened()).unwrap();
        let later = opened() + chrono::Duration::seconds(90);
        let (after, _) = engine.round_seed(&round_id, GameType::Aviator, later).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_vrf_tamper_detection() {
        let engine = VRFGameEngine::new_random();
        let round_id = RoundId::new(TableId::from("mines-1"), 9);
        let expected_input = VRFGameEngine::round_input(&round_id, GameType::Mines, opened());

        let (_, bundle) = engine.round_seed(&round_id, GameType::Mines, opened()).unwrap();

        // Output from a different round under the same key
        let other = RoundId::new(TableId::from("mines-1"), 10);
        let (_, foreign) = engine.round_seed(&other, GameType::Mines, opened()).unwrap();
        let mut swapped = bundle.clone();
        swapped.vrf_output = foreign.vrf_output;
        assert!(!VRFGameEngine::verify_vrf_proof(&swapped, &expected_input).unwrap());

        // Proof from a different key
        let (_, stranger) = VRFGameEngine::new_random()
            .round_seed(&round_id, GameType::Mines, opened())
            .unwrap();
        let mut rekeyed = bundle.clone();
        rekeyed.public_key = stranger.public_key;
        assert!(!VRFGameEngine::verify_vrf_proof(&rekeyed, &expected_input).unwrap());

        let wrong_input = VRFGameEngine::round_input(&other, GameType::Mines, opened());
        assert!(!VRFGameEngine::verify_vrf_proof(&bundle, &wrong_input).unwrap());
    }

    #[test]
    fn test_commitment_matches_seed_hash() {
        let seed = [5u8; 32];
        let commitment = VRFGameEngine::seed_commitment(&seed);
        assert_eq!(commitment.len(), 64);
        assert_ne!(commitment, VRFGameEngine::seed_commitment(&[6u8; 32]));
    }
}
