#![no_main]

use libfuzzer_sys::fuzz_target;
use mars_core::SimConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    let config = SimConfig::default();
    if let Ok(program) = redcode::assemble(source, "fuzz.red", &config) {
        // Canonical output must always re-assemble to the same program.
        let rendered = program.to_source();
        let again = redcode::assemble(&rendered, "fuzz-rendered.red", &config)
            .expect("canonical source must re-assemble");
        assert_eq!(again.instructions, program.instructions);
        assert_eq!(again.start, program.start);
    }
});
