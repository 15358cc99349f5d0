//! End-to-end scenarios through the full driver.

use blend_core::prelude::*;

fn unit(source: &str) -> Vec<SourceUnit> {
    vec![SourceUnit::new("test.blend", source)]
}

fn compile_ok(source: &str) -> Artifacts {
    let compilation = compile(&unit(source));
    match compilation.into_result() {
        Ok(artifacts) => artifacts,
        Err(CompileError::Failed { diagnostics, .. }) => {
            panic!(
                "compilation failed: {:#?}",
                diagnostics
                    .items()
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .collect::<Vec<_>>()
            );
        }
    }
}

fn opcodes(f: &IlFunction) -> Vec<Opcode> {
    f.body.iter().map(|i| i.opcode()).collect()
}

#[test]
fn s1_simple_addition_on_c64() {
    let artifacts = compile_ok(
        "module Main;\n\
         function add(a: byte, b: byte): byte { return a + b; }\n\
         export function main(): void { let x: byte = add(5, 10); poke($D020, x); }",
    );
    let map = &artifacts.frame_map;

    // Every slot has a resolved address in zero page or the frame region.
    for name in ["Main.add", "Main.main"] {
        let frame = map.frame(name).expect("frame exists");
        for slot in &frame.slots {
            let addr = slot.address.expect("slot placed").raw();
            let in_zp = map.platform.zp_range.contains(&addr);
            let in_region = map.platform.frame_region.contains(&addr);
            assert!(in_zp || in_region, "{name}.{} at ${addr:04X}", slot.name);
        }
    }

    let add_frame = map.frame("Main.add").unwrap();
    let a = add_frame.slot("a").unwrap().addr();
    let b = add_frame.slot("b").unwrap().addr();
    let ret = add_frame.return_slot().unwrap().addr();
    let x = map.frame("Main.main").unwrap().slot("x").unwrap().addr();

    // add: LOAD a; ADD b; STORE return; RETURN.
    let add_il = artifacts.il.function("Main.add").unwrap();
    assert_eq!(
        opcodes(add_il),
        vec![Opcode::Load, Opcode::Add, Opcode::Store, Opcode::Return]
    );
    assert_eq!(add_il.body[0].a(), Operand::Addr(a));
    assert_eq!(add_il.body[1].a(), Operand::Addr(b));
    assert_eq!(add_il.body[2].a(), Operand::Addr(ret));

    // main: STORE a, 5; STORE b, 10; CALL; LOAD return; STORE x; LOAD x;
    // POKE $D020; RETURN.
    let main_il = artifacts.il.function("Main.main").unwrap();
    assert_eq!(
        opcodes(main_il),
        vec![
            Opcode::Store,
            Opcode::Store,
            Opcode::Call,
            Opcode::Load,
            Opcode::Store,
            Opcode::Load,
            Opcode::Poke,
            Opcode::Return
        ]
    );
    assert_eq!(main_il.body[0].a(), Operand::Addr(a));
    assert_eq!(main_il.body[0].b(), Operand::Imm(5));
    assert_eq!(main_il.body[1].a(), Operand::Addr(b));
    assert_eq!(main_il.body[1].b(), Operand::Imm(10));
    assert_eq!(main_il.body[3].a(), Operand::Addr(ret));
    assert_eq!(main_il.body[4].a(), Operand::Addr(x));
    assert_eq!(main_il.body[6].a(), Operand::Imm(0xD020));
}

#[test]
fn s2_direct_recursion_is_rejected() {
    let compilation = compile(&unit("module Main;\nfunction f(): void { f(); }"));
    assert!(compilation
        .diagnostics
        .contains(DiagnosticCode::RecursionDetected));
    assert!(compilation.frame_map.is_none());
    assert!(compilation.il.is_none());
}

#[test]
fn s3_mutual_recursion_is_rejected() {
    let compilation = compile(&unit(
        "module Main;\nfunction a(): void { b(); }\nfunction b(): void { a(); }",
    ));
    assert!(compilation
        .diagnostics
        .contains(DiagnosticCode::MutualRecursionDetected));
    let message = &compilation
        .diagnostics
        .items()
        .iter()
        .find(|d| d.code == DiagnosticCode::MutualRecursionDetected)
        .unwrap()
        .message;
    assert!(message.contains("a → b → a"), "cycle in: {message}");
    assert!(compilation.frame_map.is_none());
}

#[test]
fn s4_frame_coalescing_reduces_memory() {
    let artifacts = compile_ok(
        "module Main;\n\
         function draw(): void { let a: word = 1; let b: word = 2; poke($0400, lo(a + b)); }\n\
         function update(): void { let c: word = 3; let d: word = 4; poke($0401, lo(c + d)); }\n\
         export function main(): void { draw(); update(); }",
    );
    let map = &artifacts.frame_map;
    let draw = map.frame("Main.draw").unwrap();
    let update = map.frame("Main.update").unwrap();

    assert_eq!(draw.group, update.group, "draw and update share a group");
    assert_eq!(draw.base, update.base, "one base address for both frames");
    assert!(
        map.stats.bytes_saved() >= 4,
        "saved {} bytes",
        map.stats.bytes_saved()
    );
}

#[test]
fn s5_isr_blocks_coalescing() {
    let artifacts = compile_ok(
        "module Main;\n\
         function helper(): void { poke($D020, 0); }\n\
         export function main(): void { helper(); }\n\
         callback function irq(): void { helper(); }",
    );
    let map = &artifacts.frame_map;
    let helper = map.frame("Main.helper").unwrap();
    assert_eq!(
        helper.context,
        ThreadContext::MAIN | ThreadContext::ISR,
        "helper runs on both lines of control"
    );
    let group = &map.groups[helper.group];
    assert_eq!(group.members.len(), 1, "`both` never shares a group");
}

#[test]
fn s6_hot_loop_variable_wins_zero_page() {
    let artifacts = compile_ok(
        "module Main;\n\
         function scan(): void { let i: byte = 0; while (i < 250) { poke($0400 + i, 32); i = i + 1; } }\n\
         export function main(): void { scan(); let cold: byte = 1; poke($D021, cold); }",
    );
    let map = &artifacts.frame_map;
    let i = map.frame("Main.scan").unwrap().slot("i").unwrap();
    let cold = map.frame("Main.main").unwrap().slot("cold").unwrap();

    assert!(i.max_loop_depth >= 1);
    assert!(
        i.zp_score > cold.zp_score,
        "hot {} vs cold {}",
        i.zp_score,
        cold.zp_score
    );
    assert_eq!(i.location, SlotLocation::ZeroPage);
    let addr = i.addr().raw();
    assert!((0x02..0x90).contains(&addr), "i at ${addr:02X}");
}

#[test]
fn imports_work_across_units() {
    let sources = vec![
        SourceUnit::new(
            "io.blend",
            "module IO;\nexport function put(v: byte): void { poke($0400, v); }",
        ),
        SourceUnit::new(
            "main.blend",
            "module Main;\nimport {put as emit} from IO;\nexport function main(): void { emit(7); }",
        ),
    ];
    let compilation = compile(&sources);
    let artifacts = compilation.into_result().expect("clean compile");
    // The call lowered against IO.put's parameter slot.
    let put = artifacts.frame_map.frame("IO.put").unwrap();
    let v = put.slot("v").unwrap().addr();
    let main_il = artifacts.il.function("Main.main").unwrap();
    assert!(main_il
        .body
        .iter()
        .any(|inst| inst.opcode() == Opcode::Store && inst.a() == Operand::Addr(v)));
    assert!(main_il.body.iter().any(|i| i.opcode() == Opcode::Call));
}

#[test]
fn import_cycles_are_fatal() {
    let sources = vec![
        SourceUnit::new("a.blend", "module A;\nimport {f} from B;\nexport function g(): void { }"),
        SourceUnit::new("b.blend", "module B;\nimport {g} from A;\nexport function f(): void { }"),
    ];
    let compilation = compile(&sources);
    assert!(compilation.diagnostics.contains(DiagnosticCode::ImportCycle));
    assert!(compilation.frame_map.is_none());
}

#[test]
fn map_variables_lower_to_literal_addresses() {
    let artifacts = compile_ok(
        "module Main;\n\
         @map BORDER at $D020: byte;\n\
         export function main(): void { BORDER = 2; }",
    );
    let main_il = artifacts.il.function("Main.main").unwrap();
    let store = main_il
        .body
        .iter()
        .find(|i| i.opcode() == Opcode::Store)
        .expect("a store");
    assert_eq!(store.a(), Operand::Addr(Addr::new(0xD020)));
}

#[test]
fn module_variables_live_in_a_module_frame() {
    let artifacts = compile_ok(
        "module Main;\n\
         let score: word = 0;\n\
         export function main(): void { score = score + 10; }",
    );
    let map = &artifacts.frame_map;
    let module_frame = map.frame("Main").expect("module pseudo-frame");
    let slot = module_frame.slot("score").expect("module variable slot");
    assert!(slot.address.is_some());
    assert_eq!(
        module_frame.context,
        ThreadContext::MAIN | ThreadContext::ISR
    );
}

#[test]
fn library_units_are_prepended() {
    let compiler = Compiler::new(CompilerConfig::default()).with_library(SourceUnit::new(
        "std/screen.blend",
        "module Screen;\nexport function clear(): void { poke($D020, 0); }",
    ));
    let compilation = compiler.compile(&unit(
        "module Main;\nimport {clear} from Screen;\nexport function main(): void { clear(); }",
    ));
    let artifacts = compilation.into_result().expect("library resolves");
    assert!(artifacts.frame_map.frame("Screen.clear").is_some());
    assert!(artifacts
        .il
        .function("Main.main")
        .unwrap()
        .body
        .iter()
        .any(|i| i.opcode() == Opcode::Call));
}

#[test]
fn x16_platform_is_honored() {
    let mut config = CompilerConfig::default();
    config.platform = PlatformConfig::x16();
    let compiler = Compiler::new(config);
    let compilation = compiler.compile(&unit(
        "module Main;\nexport function main(): void { let i: byte = 0; while (i < 10) { poke($9F20, i); i = i + 1; } }",
    ));
    let artifacts = compilation.into_result().expect("clean compile");
    let map = &artifacts.frame_map;
    let i = map.frame("Main.main").unwrap().slot("i").unwrap();
    let addr = i.addr().raw();
    // The X16 zero-page window starts at $22.
    assert!(map.platform.zp_range.contains(&addr), "i at ${addr:02X}");
    assert!(addr >= 0x22);
}
