use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_kernel::{CommandKernel, ConstructionRecipe, EvalError, GuestInterpreter, KernelError};
use bridge_protocol::ReadyProbe;
use serde_json::json;

#[derive(Default)]
struct FakeInterpreter {
    boots: AtomicUsize,
    evaluated: Mutex<Vec<String>>,
    /// Guest error raised for any code containing this needle.
    fail_on: Option<String>,
}

impl FakeInterpreter {
    fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuestInterpreter for FakeInterpreter {
    async fn boot(&self) -> Result<(), EvalError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn eval(&self, code: &str) -> Result<String, EvalError> {
        self.evaluated.lock().unwrap().push(code.to_string());
        if let Some(needle) = &self.fail_on {
            if code.contains(needle.as_str()) {
                return Err(EvalError::Guest {
                    message: format!("NameError: name '{needle}' is not defined"),
                });
            }
        }
        Ok("ok".to_string())
    }
}

fn pump_recipe() -> ConstructionRecipe {
    ConstructionRecipe {
        module: "lab.devices.pumps".into(),
        class_name: "SyringePump".into(),
        kwargs: BTreeMap::from([("port".into(), json!("COM3")), ("rate".into(), json!(1.5))]),
    }
}

#[tokio::test]
async fn boot_runs_once_across_all_calls() {
    let interpreter = Arc::new(FakeInterpreter::default());
    let kernel = CommandKernel::new(interpreter.clone());
    assert!(!kernel.is_ready());

    kernel.ensure_booted().await.expect("boot");
    kernel.ensure_booted().await.expect("boot again");
    kernel
        .ensure_device("pump", &pump_recipe())
        .await
        .expect("device");

    assert_eq!(interpreter.boots.load(Ordering::SeqCst), 1);
    assert!(kernel.is_ready());
}

#[tokio::test]
async fn device_is_constructed_once_and_cached() {
    let interpreter = Arc::new(FakeInterpreter::default());
    let kernel = CommandKernel::new(interpreter.clone());

    let first = kernel
        .ensure_device("pump", &pump_recipe())
        .await
        .expect("device");
    let second = kernel
        .ensure_device("pump", &pump_recipe())
        .await
        .expect("cached device");
    assert_eq!(first, second);

    let constructions: Vec<String> = interpreter
        .evaluated()
        .into_iter()
        .filter(|code| code.contains("import SyringePump"))
        .collect();
    assert_eq!(constructions.len(), 1);
    assert_eq!(
        constructions[0],
        "from lab.devices.pumps import SyringePump\n\
         _device_pump = SyringePump(port='COM3', rate=1.5)"
    );
}

#[tokio::test]
async fn invoke_renders_keyword_arguments_as_literals() {
    let interpreter = Arc::new(FakeInterpreter::default());
    let kernel = CommandKernel::new(interpreter.clone());
    let pump = kernel
        .ensure_device("pump", &pump_recipe())
        .await
        .expect("device");

    let kwargs = BTreeMap::from([
        ("volume_ml".to_string(), json!(2.5)),
        ("wait".to_string(), json!(true)),
        ("label".to_string(), json!("acid feed")),
    ]);
    let result = kernel.invoke(&pump, "dispense", &kwargs).await.expect("invoke");
    assert_eq!(result, "ok");

    let last = interpreter.evaluated().pop().expect("eval");
    assert_eq!(
        last,
        "_device_pump.dispense(label='acid feed', volume_ml=2.5, wait=True)"
    );
}

#[tokio::test]
async fn hostile_names_never_reach_the_interpreter() {
    let interpreter = Arc::new(FakeInterpreter::default());
    let kernel = CommandKernel::new(interpreter.clone());

    let err = kernel
        .ensure_device("pump; import os", &pump_recipe())
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::InvalidName(_)));

    let mut recipe = pump_recipe();
    recipe.module = "lab.devices; os.system('rm')".into();
    let err = kernel.ensure_device("pump", &recipe).await.unwrap_err();
    assert!(matches!(err, KernelError::InvalidRecipe(_)));

    let pump = kernel
        .ensure_device("pump", &pump_recipe())
        .await
        .expect("device");
    let err = kernel
        .invoke(&pump, "dispense()'; exit", &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::InvalidName(_)));

    let kwargs = BTreeMap::from([("bad key".to_string(), json!(1))]);
    let err = kernel.invoke(&pump, "dispense", &kwargs).await.unwrap_err();
    assert!(matches!(err, KernelError::InvalidName(_)));

    for code in interpreter.evaluated() {
        assert!(!code.contains("os.system"));
        assert!(!code.contains("exit"));
    }
}

#[tokio::test]
async fn guest_errors_surface_with_their_message() {
    let interpreter = Arc::new(FakeInterpreter {
        fail_on: Some("dispense".into()),
        ..FakeInterpreter::default()
    });
    let kernel = CommandKernel::new(interpreter);
    let pump = kernel
        .ensure_device("pump", &pump_recipe())
        .await
        .expect("device");

    let err = kernel
        .invoke(&pump, "dispense", &BTreeMap::new())
        .await
        .unwrap_err();
    match err {
        KernelError::Guest { message } => assert!(message.contains("NameError")),
        other => panic!("unexpected error: {other}"),
    }
}
