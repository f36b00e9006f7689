use std::fmt::Write as _;
use std::fs;

use crate::emperfect::EmperfectError;
use crate::testcase::Testcase;

// Fixed preamble of every generated translation unit: type-name machinery
// and the stringification helpers the instrumented checks rely on.
const BOILERPLATE: &str = r#"// This is a test file autogenerated by Emperfect.

#include <fstream>
#include <iostream>
#include <unordered_map>
#include <sstream>
#include <string>
#include <tuple>
#include <type_traits>
#include <vector>

// Extract information about a function.
template <typename... Ts> struct FunInfo;
template <typename RETURN_T, typename... ARG_Ts>
struct FunInfo<RETURN_T(ARG_Ts...)> {
  using return_t = RETURN_T;
  template <size_t N> using arg_t = std::tuple_element_t<N, std::tuple<ARG_Ts...>>;
  static constexpr size_t ArgCount() { return sizeof...(ARG_Ts); }
};
// Build a map of internal type names to human-readable type names.
static std::string _EMP_ConvertTypeName(std::string in) {
  static std::unordered_map<std::string, std::string> type_map;
  if (type_map.size() == 0) {
    type_map[ typeid(bool).name() ]        = "bool";
    type_map[ typeid(char).name() ]        = "char";
    type_map[ typeid(double).name() ]      = "double";
    type_map[ typeid(float).name() ]       = "float";
    type_map[ typeid(int).name() ]         = "int";
    type_map[ typeid(int8_t).name() ]      = "int8_t";
    type_map[ typeid(int16_t).name() ]     = "int16_t";
    type_map[ typeid(int32_t).name() ]     = "int32_t";
    type_map[ typeid(int64_t).name() ]     = "int64_t";
    type_map[ typeid(uint8_t).name() ]     = "uint8_t";
    type_map[ typeid(uint16_t).name() ]    = "uint16_t";
    type_map[ typeid(uint32_t).name() ]    = "uint32_t";
    type_map[ typeid(uint64_t).name() ]    = "uint64_t";
    type_map[ typeid(size_t).name() ]      = "size_t";
    type_map[ typeid(std::string).name() ] = "std::string";
  }
  if (type_map.find(in) != type_map.end()) return type_map[in];
  return in; // No alternative name found.
}

// Type Traits...
template<typename... Ts> struct is_vector : std::false_type { };
template<typename... Ts> struct is_vector<std::vector<Ts...>> : std::true_type { };

// Convert a C++ type into its type name.
template <typename T>
std::string _EMP_GetTypeName() {
  std::string name = typeid(T).name();
  constexpr bool is_fun = std::is_function<T>();
  if constexpr (is_fun) {
    using return_t = typename FunInfo<T>::return_t;
    constexpr size_t arg_count = FunInfo<T>::ArgCount();
    name = _EMP_GetTypeName<return_t>();
    name += '(';
    if constexpr (arg_count >= 1) { using arg_t = typename FunInfo<T>::arg_t<0>; name += _EMP_GetTypeName<arg_t>(); }
    if constexpr (arg_count >= 2) { using arg_t = typename FunInfo<T>::arg_t<1>; name += ','; name += _EMP_GetTypeName<arg_t>(); }
    if constexpr (arg_count >= 3) { using arg_t = typename FunInfo<T>::arg_t<2>; name += ','; name += _EMP_GetTypeName<arg_t>(); }
    if constexpr (arg_count >= 4) { using arg_t = typename FunInfo<T>::arg_t<3>; name += ','; name += _EMP_GetTypeName<arg_t>(); }
    if constexpr (arg_count >= 5) { using arg_t = typename FunInfo<T>::arg_t<4>; name += ','; name += _EMP_GetTypeName<arg_t>(); }
    if constexpr (arg_count >= 6) { using arg_t = typename FunInfo<T>::arg_t<5>; name += ','; name += _EMP_GetTypeName<arg_t>(); }
    name += ')';
  }
  else if constexpr (is_vector<T>()) {
    name = "std::vector<";
    name += _EMP_GetTypeName<typename T::value_type>();
    name += '>';
  }
  else {
    name = _EMP_ConvertTypeName(name);
  }
  if (std::is_const<T>()) name += " const";
  if (std::is_reference<T>()) name += " &";
  return name;
}

// Convert a char to an escape char if needed.
std::string to_esc(char c) {
  switch (c) {
  case '\0': return "\\0";
  case '\n': return "\\n";
  case '\r': return "\\r";
  case '\t': return "\\t";
  case '\'': return "\\\'";
  case '\"': return "\\\"";
  case '\\': return "\\\\";
  }
  return std::string(1,c);
}
std::string to_esc(std::string str) {
  std::string out;
  for (char x : str) out += to_esc(x);
  return out;
}

std::string to_literal(char c) {
  std::string out("\'");
  out += to_esc(c);
  out += "\'";
  return out;
}
std::string to_literal(std::string str) {
  while (str.size() && str[0]==' ') str.erase(0,1); // Erase leading whitespace
  std::string out("\"");
  out += to_esc(str);
  out += "\"";
  return out;
}
std::string to_literal(const char * str) { return to_literal(std::string(str)); }
template <typename T> const T & to_literal(const T & val) { return val; }

"#;

/// Write the complete generated source for one test: boilerplate, the shared
/// header, the rewritten body inside _emperfect_main (which opens the results
/// file and reports the score), and a file-scope runner object whose
/// constructor runs the checks before main().
pub fn write_test_cpp(test: &Testcase, header: &str, body: &str) -> Result<(), EmperfectError> {
    let mut cpp = String::with_capacity(BOILERPLATE.len() + header.len() + body.len() + 1024);
    cpp.push_str(BOILERPLATE);
    cpp.push_str(header);
    cpp.push('\n');

    writeln!(cpp, "void _emperfect_main() {{").unwrap();
    writeln!(cpp, "  std::ofstream _emperfect_results(\"{}\");", test.result_filename).unwrap();
    writeln!(cpp, "  size_t _emperfect_error_count = 0;").unwrap();
    writeln!(cpp, "  [[maybe_unused]] size_t _emperfect_check_id = 0;\n").unwrap();

    cpp.push_str(body);
    cpp.push('\n');

    writeln!(cpp, "  _emperfect_results << \"SCORE \" << (!_emperfect_error_count ? {} : 0) << \"\\n\";",
             test.points).unwrap();
    cpp.push_str("}\n\n");

    cpp.push_str("// Build a test runner to be executed before main().\n");
    cpp.push_str("struct _emperfect_runner {\n");
    cpp.push_str("  _emperfect_runner() {\n");
    cpp.push_str("    _emperfect_main();\n");
    if !test.call_main {
        cpp.push_str("    exit(0); // Don't execute main().\n");
    }
    cpp.push_str("  }\n");
    cpp.push_str("};\n\n");
    cpp.push_str("static _emperfect_runner runner;\n");

    fs::write(&test.cpp_filename, cpp)
        .map_err(|err| EmperfectError::FileError(test.cpp_filename.clone(), err))?;
    Ok(())
}
