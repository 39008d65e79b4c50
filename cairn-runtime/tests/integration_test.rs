//! Runtime integration tests: compiled programs executed end to end

use cairn_compiler::compile_main;
use cairn_runtime::error::{MemoryError, RunnerError, VirtualMachineError};
use cairn_runtime::{
    run, BuiltinHintProcessor, CairnRunner, HashCapabilities, VmConfig,
};
use cairn_spec::{Felt, MaybeRelocatable, Relocatable};

fn run_source(source: &str) -> cairn_runtime::RunOutput {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let program = compile_main(source).unwrap();
    run(program).unwrap()
}

#[test]
fn test_arithmetic_program() {
    let output = run_source(
        "\
func main():
    [ap] = 6; ap++
    [ap] = [ap - 1] * 7; ap++
    ret
end
",
    );
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(42u64))
    );
    assert_eq!(output.runner.vm.current_step(), 3);
}

#[test]
fn test_function_call_and_return() {
    let output = run_source(
        "\
func double(x : felt) -> (res : felt):
    return (x + x)
end

func main():
    [ap] = 21; ap++
    call double
    ret
end
",
    );
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(42u64))
    );
}

#[test]
fn test_if_else_takes_equal_branch() {
    let output = run_source(
        "\
func main():
    [ap] = 7; ap++
    let x = [ap - 1]
    if x == 7:
        [ap] = 1; ap++
    else:
        [ap] = 2; ap++
    end
    ret
end
",
    );
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(1u64))
    );
}

#[test]
fn test_if_else_takes_not_equal_branch() {
    let output = run_source(
        "\
func main():
    [ap] = 8; ap++
    let x = [ap - 1]
    if x == 7:
        [ap] = 1; ap++
    else:
        [ap] = 2; ap++
    end
    ret
end
",
    );
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(2u64))
    );
}

#[test]
fn test_and_chain_condition() {
    let output = run_source(
        "\
func main():
    [ap] = 10; ap++
    [ap] = 12; ap++
    let a = [ap - 2]
    let b = [ap - 1]
    if a == 10 and b == 12:
        [ap] = 1; ap++
    end
    ret
end
",
    );
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(1u64))
    );
}

#[test]
fn test_output_builtin_collects_values() {
    let output = run_source(
        "\
%builtins output

func main():
    tempvar value = 42
    let out = [fp - 3]
    [out] = value
    ret
end
",
    );
    assert_eq!(output.runner.get_output().unwrap(), vec![Felt::from(42u64)]);
    let resources = output.runner.get_execution_resources().unwrap();
    assert_eq!(resources.builtin_instance_counter["output"], 1);
}

#[test]
fn test_range_check_accepts_small_values() {
    let output = run_source(
        "\
%builtins range_check

func main():
    tempvar value = 1
    let rc = [fp - 3]
    [rc] = value
    ret
end
",
    );
    let resources = output.runner.get_execution_resources().unwrap();
    assert_eq!(resources.builtin_instance_counter["range_check"], 1);
}

#[test]
fn test_range_check_rejects_minus_one() {
    let program = compile_main(
        "\
%builtins range_check

func main():
    tempvar value = 0 - 1
    let rc = [fp - 3]
    [rc] = value
    ret
end
",
    )
    .unwrap();
    let err = run(program).unwrap_err();
    let RunnerError::Vm(exception) = err else {
        panic!("expected a VM exception");
    };
    assert!(matches!(
        exception.inner,
        VirtualMachineError::Memory(MemoryError::RangeCheckOutOfBounds { .. })
    ));
}

#[test]
fn test_step_limit_exceeded() {
    let program = compile_main(
        "\
func main():
    loop:
    jmp loop
end
",
    )
    .unwrap();
    let crypto = HashCapabilities::default();
    let config = VmConfig {
        max_steps: 50,
        enable_trace: false,
    };
    let mut runner = CairnRunner::new(program, config, &crypto).unwrap();
    let end = runner.initialize().unwrap();
    let mut hp = BuiltinHintProcessor::new();
    let err = runner.run_until_pc(end, &mut hp).unwrap_err();
    let RunnerError::Vm(exception) = err else {
        panic!("expected a VM exception");
    };
    assert!(matches!(
        exception.inner,
        VirtualMachineError::StepLimitExceeded(50)
    ));
}

#[test]
fn test_trace_records_one_entry_per_step() {
    let output = run_source(
        "\
func main():
    [ap] = 1; ap++
    [ap] = 2; ap++
    ret
end
",
    );
    let steps = output.runner.vm.current_step();
    assert_eq!(output.runner.vm.trace().len() as u64, steps);
    let relocated = output.runner.relocated_trace().unwrap();
    assert_eq!(relocated.len() as u64, steps);
    // The first entry starts at the program's main pc in flat space
    assert_eq!(relocated[0].pc, 1);
}

#[test]
fn test_relocated_memory_is_contiguous_from_one() {
    let output = run_source(
        "\
func main():
    [ap] = 9; ap++
    ret
end
",
    );
    let memory = output.runner.relocated_memory().unwrap();
    // Program words start at flat address 1
    assert!(memory.contains_key(&1));
    assert!(!memory.contains_key(&0));
}

#[test]
fn test_vm_exception_carries_pc() {
    let program = compile_main(
        "\
func main():
    [ap] = 1; ap++
    [ap - 1] = 2
    ret
end
",
    )
    .unwrap();
    let err = run(program).unwrap_err();
    let RunnerError::Vm(exception) = err else {
        panic!("expected a VM exception");
    };
    assert_eq!(exception.pc, Relocatable::new(0, 2));
    assert!(matches!(
        exception.inner,
        VirtualMachineError::DiffAssertValues { .. }
    ));
}

#[test]
fn test_air_private_input_sampling() {
    let output = run_source(
        "\
%builtins range_check

func main():
    tempvar value = 1
    let rc = [fp - 3]
    [rc] = value
    ret
end
",
    );
    let samples = output.runner.air_private_input(2);
    let entries = samples["range_check"].as_array().unwrap();
    let steps = output.runner.vm.current_step() as usize;
    assert_eq!(entries.len(), steps.div_ceil(2));
    assert_eq!(entries[0]["step"], 0);
}
