//! Wake gating and audio encoding over synthetic signals.

use hearth::voice::{GateState, SAMPLE_RATE, WakeGate, samples_to_wav};

/// 200ms of a loud tone
fn speech_chunk() -> Vec<f32> {
    (0..3200)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (t * 300.0 * 2.0 * std::f32::consts::PI).sin() * 0.4
        })
        .collect()
}

/// 200ms of silence
fn silence_chunk() -> Vec<f32> {
    vec![0.0f32; 3200]
}

fn gate() -> WakeGate {
    WakeGate::new(vec!["hey hearth".to_string()]).unwrap()
}

#[test]
fn silence_never_wakes_the_gate() {
    let mut gate = gate();

    for _ in 0..100 {
        assert!(!gate.feed(&silence_chunk()));
    }
    assert_eq!(gate.state(), GateState::Idle);
}

#[test]
fn speech_then_silence_yields_candidate_segment() {
    let mut gate = gate();

    // 2s of speech
    for _ in 0..10 {
        assert!(!gate.feed(&speech_chunk()));
    }
    assert_eq!(gate.state(), GateState::Gathering);

    // Just over 1s of silence ends the segment
    let mut ready = false;
    for _ in 0..6 {
        if gate.feed(&silence_chunk()) {
            ready = true;
            break;
        }
    }
    assert!(ready);

    let segment = gate.take_segment();
    assert!(segment.len() >= 10 * 3200);
}

#[test]
fn short_blip_is_discarded() {
    let mut gate = gate();

    // 400ms of noise, then long silence: below the minimum utterance
    gate.feed(&speech_chunk());
    gate.feed(&speech_chunk());

    let mut ready = false;
    for _ in 0..20 {
        if gate.feed(&silence_chunk()) {
            ready = true;
        }
    }
    assert!(!ready);
    assert_eq!(gate.state(), GateState::Idle);
}

#[test]
fn wake_confirmation_arms_then_captures_command() {
    let mut gate = gate();

    // Candidate segment
    for _ in 0..10 {
        gate.feed(&speech_chunk());
    }
    for _ in 0..6 {
        gate.feed(&silence_chunk());
    }
    gate.take_segment();

    assert!(gate.confirm_wake("hey hearth"));
    assert!(gate.is_armed());

    // Follow-up command: speech then end-of-speech silence
    for _ in 0..10 {
        gate.feed(&speech_chunk());
    }
    for _ in 0..6 {
        gate.feed(&silence_chunk());
    }
    assert!(gate.utterance_complete());
    assert!(!gate.take_segment().is_empty());
}

#[test]
fn unrelated_transcript_resets_to_idle() {
    let mut gate = gate();

    for _ in 0..10 {
        gate.feed(&speech_chunk());
    }
    for _ in 0..6 {
        gate.feed(&silence_chunk());
    }

    assert!(!gate.confirm_wake("just people talking in the room"));
    assert_eq!(gate.state(), GateState::Idle);
    assert!(gate.take_segment().is_empty());
}

#[test]
fn wav_encoding_round_trips_through_hound() {
    let samples: Vec<f32> = (0..1600)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5
        })
        .collect();

    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len(), 1600);
}

#[test]
fn wav_encoding_clamps_out_of_range_samples() {
    let samples = vec![2.0f32, -2.0, 0.0];
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    let decoded: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(decoded[0], i16::MAX);
    assert_eq!(decoded[1], i16::MIN);
    assert_eq!(decoded[2], 0);
}
