//! Quantified allocator properties and boundary behaviors.

use blend_core::alloc;
use blend_core::prelude::*;

fn unit(source: &str) -> Vec<SourceUnit> {
    vec![SourceUnit::new("test.blend", source)]
}

fn compile_ok(source: &str) -> Artifacts {
    compile(&unit(source)).into_result().expect("clean compile")
}

const PROGRAM: &str = "module Main;\n\
    let lives: byte = 3;\n\
    @map BORDER at $D020: byte;\n\
    function clamp(v: word, limit: word): word { if (v > limit) { return limit; } return v; }\n\
    function draw(): void { let row: byte = 0; while (row < 25) { poke($0400 + row, 32); row = row + 1; } }\n\
    function update(): void { let delta: word = clamp(7, 5); poke($C000, lo(delta)); }\n\
    export function main(): void { draw(); update(); BORDER = lives; }";

#[test]
fn p1_p3_p4_frame_map_self_check_holds() {
    let artifacts = compile_ok(PROGRAM);
    alloc::verify(&artifacts.frame_map).expect("invariants hold");
}

#[test]
fn p2_coalesce_groups_share_context_and_never_overlap_callers() {
    let artifacts = compile_ok(PROGRAM);
    for group in &artifacts.frame_map.groups {
        if group.members.len() > 1 {
            assert!(group.context.coalescable(), "shared groups have one context");
            for &member in &group.members {
                let frame = artifacts.frame_map.frame_of(member);
                assert_eq!(frame.context, group.context);
            }
        }
    }
}

#[test]
fn p5_compilation_is_deterministic() {
    let first = compile_ok(PROGRAM);
    let second = compile_ok(PROGRAM);
    assert_eq!(
        format!("{:?}", first.frame_map.frames()),
        format!("{:?}", second.frame_map.frames())
    );
    assert_eq!(
        format!("{:?}", first.frame_map.groups),
        format!("{:?}", second.frame_map.groups)
    );
    assert_eq!(first.frame_map.stats, second.frame_map.stats);
    for (a, b) in first.il.functions.iter().zip(&second.il.functions) {
        assert_eq!(a.body, b.body, "IL of {} differs", a.name);
    }
}

#[test]
fn p6_no_frame_map_without_an_acyclic_call_graph() {
    let compilation = compile(&unit(
        "module Main;\nfunction f(): void { g(); }\nfunction g(): void { f(); }",
    ));
    assert!(compilation.frame_map.is_none());
    assert!(compilation.il.is_none());
}

#[test]
fn p7_every_address_operand_is_a_slot_or_map_literal() {
    let artifacts = compile_ok(PROGRAM);
    let map = &artifacts.frame_map;

    let mut known: Vec<(u16, u16)> = Vec::new();
    for frame in map.frames() {
        for slot in &frame.slots {
            if let Some(addr) = slot.address {
                known.push((addr.raw(), addr.raw() + slot.size.max(1) - 1));
            }
        }
    }
    // The only `@map` literal in the program.
    known.push((0xD020, 0xD020));

    for function in &artifacts.il.functions {
        for inst in &function.body {
            for operand in inst.operands() {
                if let Operand::Addr(addr) = operand {
                    let a = addr.raw();
                    assert!(
                        known.iter().any(|&(lo, hi)| (lo..=hi).contains(&a)),
                        "{}: operand ${a:04X} is neither a slot nor a map literal",
                        function.name
                    );
                }
            }
        }
    }
}

#[test]
fn boundary_single_256_byte_local_is_accepted() {
    let artifacts = compile_ok(
        "module Main;\n\
         export function main(): void { let buf: byte[256]; poke($C000, buf[0]); }",
    );
    let frame = artifacts.frame_map.frame("Main.main").unwrap();
    assert_eq!(frame.raw_size, 256);
    alloc::verify(&artifacts.frame_map).expect("invariants hold");
}

#[test]
fn boundary_257_bytes_overflow_the_frame() {
    let compilation = compile(&unit(
        "module Main;\nexport function main(): void { let buf: byte[257]; poke($C000, buf[0]); }",
    ));
    assert!(compilation.diagnostics.contains(DiagnosticCode::FrameOverflow));
    assert!(compilation.frame_map.is_none());
}

#[test]
fn boundary_zp_exhaustion_fails_the_required_slot() {
    let compilation = compile(&unit(
        "module Main;\nexport function main(): void { @zp let big: byte[200]; poke($C000, big[0]); }",
    ));
    assert!(compilation
        .diagnostics
        .contains(DiagnosticCode::ZpRequiredFailed));
    assert!(compilation.frame_map.is_none());
}

#[test]
fn boundary_empty_body_frame_holds_params_and_return_only() {
    let artifacts = compile_ok(
        "module Main;\n\
         function blank(a: byte, b: word): byte { return a; }\n\
         export function main(): void { poke($C000, blank(1, 2)); }",
    );
    let frame = artifacts.frame_map.frame("Main.blank").unwrap();
    let names: Vec<&str> = frame.slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "return"]);
    assert_eq!(frame.raw_size, 1 + 2 + 1);
}

#[test]
fn deep_loops_compound_the_score() {
    let artifacts = compile_ok(
        "module Main;\n\
         export function main(): void {\n\
           let hot: byte = 0;\n\
           let cool: byte = 0;\n\
           cool = cool + 1;\n\
           for a from 0 to 3 { for b from 0 to 3 { for c from 0 to 3 { hot = hot + 1; } } }\n\
           poke($C000, hot + cool);\n\
         }",
    );
    let frame = artifacts.frame_map.frame("Main.main").unwrap();
    let hot = frame.slot("hot").unwrap();
    let cool = frame.slot("cool").unwrap();
    assert_eq!(hot.max_loop_depth, 3);
    // Depth three at the default base doubles the bonus three times.
    assert!(hot.zp_score >= cool.zp_score * 4);
}

#[test]
fn rerunning_the_allocator_inputs_changes_nothing() {
    // Idempotence: the same program compiled twice produces stable slot
    // addresses, group assignment and zero-page choices.
    let first = compile_ok(PROGRAM);
    let second = compile_ok(PROGRAM);
    for frame in first.frame_map.frames() {
        let other = second.frame_map.frame(&frame.func).unwrap();
        assert_eq!(frame.base, other.base);
        for (a, b) in frame.slots.iter().zip(&other.slots) {
            assert_eq!(a.address, b.address, "{}.{}", frame.func, a.name);
            assert_eq!(a.location, b.location);
            assert_eq!(a.zp_score, b.zp_score);
        }
    }
}
