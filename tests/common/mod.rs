//! Test helpers: an interpreter for the statement subset the generator emits
//! in composite functions and root calls. Leaf functions are supplied as Rust
//! closures.

#![allow(dead_code)]

use std::collections::HashMap;

use shader_graph::GeneratedShader;
use shader_graph::uniforms::UniformTable;

pub type Value = Vec<f32>;
pub type Native = Box<dyn Fn(&[Value]) -> Value>;

struct Function {
    params: Vec<(bool, String)>,
    body: Vec<String>,
}

pub struct Evaluator {
    natives: HashMap<String, Native>,
    functions: HashMap<String, Function>,
    uniforms: HashMap<String, Value>,
    defines: Vec<String>,
}

impl Evaluator {
    pub fn new(shader: &GeneratedShader, uniforms: &UniformTable) -> Self {
        Evaluator {
            natives: HashMap::new(),
            functions: parse_functions(&shader.declarations),
            uniforms: uniforms
                .iter()
                .map(|(k, v)| (k.clone(), v.components().to_vec()))
                .collect(),
            defines: vec!["FRAGMENT".to_string()],
        }
    }

    pub fn native(mut self, name: &str, f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        self.natives.insert(name.to_string(), Box::new(f));
        self
    }

    /// Run the root call and return every local it defines.
    pub fn run(&self, call: &str) -> HashMap<String, Value> {
        let mut env = HashMap::new();
        let lines: Vec<String> = call.lines().map(str::to_string).collect();
        self.exec(&lines, &mut env);
        env
    }

    fn exec(&self, lines: &[String], env: &mut HashMap<String, Value>) {
        let mut skipping = false;
        for line in lines {
            let line = line.trim();
            if let Some(define) = line.strip_prefix("#ifdef ") {
                skipping = !self.defines.iter().any(|d| d == define.trim());
                continue;
            }
            if line == "#endif" {
                skipping = false;
                continue;
            }
            if skipping || line.is_empty() {
                continue;
            }
            let stmt = line.trim_end_matches(';');
            if let Some(rest) = stmt.strip_prefix("const ") {
                let (decl, expr) = rest.split_once(" = ").expect("const initializer");
                let name = decl.split_whitespace().last().expect("const name");
                let value = self.eval(expr, env);
                env.insert(name.to_string(), value);
            } else if let Some((target, expr)) = stmt.split_once(" = ") {
                let value = self.eval_or_call(expr, env);
                env.insert(target.trim().to_string(), value);
            } else if stmt.contains('(') {
                self.call(stmt, env);
            } else {
                // `<type> <name>` declaration.
                let name = stmt.split_whitespace().last().expect("declared name");
                env.entry(name.to_string()).or_default();
            }
        }
    }

    fn eval_or_call(&self, expr: &str, env: &mut HashMap<String, Value>) -> Value {
        let name = expr.split('(').next().unwrap_or_default();
        if self.natives.contains_key(name) || self.functions.contains_key(name) {
            self.call(expr, env)
        } else {
            self.eval(expr, env)
        }
    }

    /// Call a native leaf (returns its value) or a composite (writes outs).
    fn call(&self, expr: &str, env: &mut HashMap<String, Value>) -> Value {
        let open = expr.find('(').expect("call");
        let name = &expr[..open];
        let inner = &expr[open + 1..expr.rfind(')').expect("call close")];
        let args = split_args(inner);

        if let Some(native) = self.natives.get(name) {
            let values: Vec<Value> = args.iter().map(|a| self.eval(a, env)).collect();
            return native(&values);
        }
        let function = self
            .functions
            .get(name)
            .unwrap_or_else(|| panic!("unknown function `{name}`"));
        let mut local = HashMap::new();
        for ((is_out, param), arg) in function.params.iter().zip(&args) {
            if !is_out {
                local.insert(param.clone(), self.eval(arg, env));
            }
        }
        self.exec(&function.body, &mut local);
        for ((is_out, param), arg) in function.params.iter().zip(&args) {
            if *is_out {
                env.insert(arg.trim().to_string(), local.get(param).cloned().unwrap_or_default());
            }
        }
        Vec::new()
    }

    fn eval(&self, expr: &str, env: &HashMap<String, Value>) -> Value {
        let expr = expr.trim();
        if let Some(open) = expr.find('(') {
            let ty = &expr[..open];
            let n = match ty {
                "float" => 1,
                "vec2" => 2,
                "vec3" => 3,
                "vec4" => 4,
                other => panic!("unexpected call `{other}` in expression"),
            };
            let inner = &expr[open + 1..expr.rfind(')').expect("literal close")];
            let parts: Vec<f32> = split_args(inner)
                .iter()
                .map(|p| p.trim().parse::<f32>().expect("float literal"))
                .collect();
            return if parts.len() == 1 { vec![parts[0]; n] } else { parts };
        }
        let (base, swizzle) = match expr.split_once('.') {
            Some((b, s)) => (b, Some(s)),
            None => (expr, None),
        };
        let value = env
            .get(base)
            .or_else(|| self.uniforms.get(base))
            .unwrap_or_else(|| panic!("unbound identifier `{base}`"))
            .clone();
        match swizzle {
            Some(s) => s
                .chars()
                .map(|c| {
                    let i = ["xyzw", "rgba", "stpq"]
                        .iter()
                        .find_map(|set| set.find(c))
                        .expect("swizzle component");
                    value[i]
                })
                .collect(),
            None => value,
        }
    }
}

fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Multi-line `void name(...) {` functions, i.e. the generated composites.
fn parse_functions(declarations: &str) -> HashMap<String, Function> {
    let mut functions = HashMap::new();
    let mut lines = declarations.lines();
    while let Some(line) = lines.next() {
        let Some(header) = line.strip_prefix("void ").and_then(|h| h.strip_suffix(") {")) else {
            continue;
        };
        let (name, params) = header.split_once('(').expect("function header");
        let params = split_args(params)
            .into_iter()
            .map(|p| {
                let tokens: Vec<&str> = p.split_whitespace().collect();
                (tokens[0] == "out", tokens[tokens.len() - 1].to_string())
            })
            .collect();
        let body = lines
            .by_ref()
            .take_while(|l| *l != "}")
            .map(str::to_string)
            .collect();
        functions.insert(name.to_string(), Function { params, body });
    }
    functions
}

pub fn add(args: &[Value]) -> Value {
    args[0].iter().zip(&args[1]).map(|(a, b)| a + b).collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6, "{actual:?} vs {expected:?}");
    }
}
