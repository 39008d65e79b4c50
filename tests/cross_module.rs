//! Cross-module import tests
//!
//! Module collection resolves `from X import Y` through the module-reader
//! capability; imported functions compile into the same program and are
//! callable from the main module.

use cairn_compiler::error::{CompileError, PreprocessorError};
use cairn_compiler::{compile_source, MapModuleReader};
use cairn_runtime::run;
use cairn_spec::{Felt, MaybeRelocatable};

fn reader_with_math() -> MapModuleReader {
    let mut reader = MapModuleReader::new();
    reader.insert(
        "lib.math",
        "\
const SHIFT = 10

func add_shift(x : felt) -> (res : felt):
    return (x + SHIFT)
end
",
    );
    reader
}

#[test]
fn test_imported_function_is_callable() {
    let source = "\
from lib.math import add_shift

func main():
    [ap] = 32; ap++
    call add_shift
    ret
end
";
    let program = compile_source("main.cairn", source, Box::new(reader_with_math())).unwrap();
    let output = run(program).unwrap();
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(42u64))
    );
}

#[test]
fn test_imported_alias() {
    let source = "\
from lib.math import add_shift as shifted

func main():
    [ap] = 1; ap++
    call shifted
    ret
end
";
    let program = compile_source("main.cairn", source, Box::new(reader_with_math())).unwrap();
    let output = run(program).unwrap();
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(11u64))
    );
}

#[test]
fn test_imported_constant() {
    let source = "\
from lib.math import SHIFT

func main():
    [ap] = SHIFT; ap++
    ret
end
";
    let program = compile_source("main.cairn", source, Box::new(reader_with_math())).unwrap();
    assert_eq!(
        program.data[1],
        MaybeRelocatable::Int(Felt::from(10u64))
    );
}

#[test]
fn test_module_loaded_once_across_importers() {
    let mut reader = reader_with_math();
    reader.insert(
        "lib.wrap",
        "\
from lib.math import add_shift

func wrapped(x : felt) -> (res : felt):
    [ap] = x; ap++
    call add_shift
    ret
end
",
    );
    let source = "\
from lib.math import SHIFT
from lib.wrap import wrapped

func main():
    [ap] = 5; ap++
    call wrapped
    ret
end
";
    let program = compile_source("main.cairn", source, Box::new(reader)).unwrap();
    let output = run(program).unwrap();
    assert_eq!(
        output.runner.read_ap_cell(1).unwrap(),
        MaybeRelocatable::Int(Felt::from(15u64))
    );
}

#[test]
fn test_missing_module_error() {
    let source = "from lib.absent import f\nfunc main():\n    ret\nend\n";
    let err =
        compile_source("main.cairn", source, Box::new(MapModuleReader::new())).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Preprocessor(PreprocessorError::ModuleNotFound { .. })
    ));
}

#[test]
fn test_cyclic_import_error() {
    let mut reader = MapModuleReader::new();
    reader.insert("a", "from b import g\nfunc f():\n    ret\nend\n");
    reader.insert("b", "from a import f\nfunc g():\n    ret\nend\n");
    let source = "from a import f\nfunc main():\n    ret\nend\n";
    let err = compile_source("main.cairn", source, Box::new(reader)).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Preprocessor(PreprocessorError::CyclicImport { .. })
    ));
}
